use std::path::Path;
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BINARY: &str = env!("CARGO_BIN_EXE_juben");

/// A command with config, data and log settings isolated in `home`.
fn juben(home: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(BINARY);
    cmd.args(args)
        .current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("JUBEN_STORAGE__PATH", home.join("identity.json"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("JUBEN_LOG_LEVEL")
        .env_remove("JUBEN_API_BASE_URL")
        .env_remove("VITE_API_BASE_URL");
    cmd
}

fn run_juben(args: &[&str]) -> Output {
    let home = TempDir::new().unwrap();
    juben(home.path(), args)
        .output()
        .expect("Failed to execute juben command")
}

async fn run_against(server: &MockServer, home: &Path, args: &[&str]) -> Output {
    let mut cmd = juben(home, args);
    cmd.env("JUBEN_API_BASE_URL", server.uri())
        .env("JUBEN_API__RETRY_DELAY_MS", "1");

    tokio::task::spawn_blocking(move || cmd.output().expect("Failed to execute juben command"))
        .await
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_juben(&["version"]);
        let out = stdout(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(out.contains("juben"));
        assert!(out.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_juben(&["version", "--detailed"]);
        let out = stdout(&output);

        assert!(output.status.success());
        assert!(out.contains("Version:"));
        assert!(out.contains("Backend:"));
        assert!(out.contains("http://localhost:8000/juben"));
    }

    #[test]
    fn test_version_flag() {
        let output = run_juben(&["--version"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
    }
}

mod help_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_juben(&["--help"]);
        let out = stdout(&output);

        assert!(output.status.success());
        for command in ["chat", "health", "status", "agents", "session", "export", "version"] {
            assert!(out.contains(command), "help should mention '{}'", command);
        }
    }

    #[test]
    fn test_chat_help_lists_options() {
        let output = run_juben(&["chat", "--help"]);
        let out = stdout(&output);

        assert!(output.status.success());
        assert!(out.contains("--stop-on-error"));
        assert!(out.contains("--background"));
        assert!(out.contains("--file"));
    }
}

mod error_handling_tests {
    use super::*;

    #[test]
    fn test_invalid_command() {
        let output = run_juben(&["compose"]);
        assert!(!output.status.success());
        assert!(stderr(&output).contains("compose"));
    }

    #[test]
    fn test_chat_requires_agent_and_query() {
        let output = run_juben(&["chat"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_blank_query_is_rejected_before_network() {
        let output = run_juben(&["chat", "short_drama_creator", "   "]);
        let err = stderr(&output);

        assert!(!output.status.success());
        assert!(err.contains("The input is invalid, please check it and retry."));
        assert!(!err.contains("Details"));
    }

    #[test]
    fn test_verbose_shows_error_details() {
        let output = run_juben(&["--verbose", "chat", "short_drama_creator", "   "]);
        let err = stderr(&output);

        assert!(!output.status.success());
        assert!(err.contains("Details"));
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let home = TempDir::new().unwrap();
        let output = juben(home.path(), &["health"])
            .env("JUBEN_API_BASE_URL", "ftp://backend.test")
            .output()
            .unwrap();

        assert!(!output.status.success());
        assert!(stderr(&output).contains("Configuration error"));
    }

    #[test]
    fn test_bad_background_pair() {
        let output = run_juben(&["chat", "agent", "hi", "--background", "novalue"]);
        assert!(!output.status.success());
        assert!(stderr(&output).contains("key=value"));
    }
}

mod session_command_tests {
    use super::*;

    #[test]
    fn test_identity_persists_between_runs() {
        let home = TempDir::new().unwrap();

        let first = juben(home.path(), &["session", "show"]).output().unwrap();
        let second = juben(home.path(), &["session"]).output().unwrap();

        assert!(first.status.success());
        assert!(second.status.success());
        assert!(stdout(&first).contains("user_"));
        assert!(stdout(&first).contains("session_"));
        assert_eq!(stdout(&first), stdout(&second));
    }

    #[test]
    fn test_new_session_changes_session_but_not_user() {
        let home = TempDir::new().unwrap();

        let before = stdout(&juben(home.path(), &["session", "show"]).output().unwrap());
        let new = juben(home.path(), &["session", "new"]).output().unwrap();
        let after = stdout(&juben(home.path(), &["session", "show"]).output().unwrap());

        assert!(new.status.success());
        assert_ne!(before, after);

        let user_line = |s: &str| {
            s.lines()
                .find(|line| line.contains("User:"))
                .map(str::to_string)
        };
        assert_eq!(user_line(&before), user_line(&after));
    }
}

mod backend_command_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chat_streams_content_to_stdout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/juben/short_drama_creator"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"type\":\"content\",\"content\":\"第一幕\"}\n\n\
                 data: {\"type\":\"content\",\"content\":\" opens\"}\n\n\
                 data: {\"type\":\"done\",\"content\":\"\"}\n\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let output = run_against(
            &server,
            home.path(),
            &["chat", "short_drama_creator", "pitch a drama", "--theme", "revenge"],
        )
        .await;

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        let out = stdout(&output);
        assert!(out.contains("第一幕 opens"));
        assert!(out.contains("3 events"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chat_json_prints_event_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/juben/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"type\":\"content\",\"content\":\"hi\"}\n\ndata: [DONE]\n\n",
            ))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let output = run_against(&server, home.path(), &["chat", "agent", "q", "--json"]).await;

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        let out = stdout(&output);
        let first_line = out.lines().find(|line| !line.trim().is_empty()).unwrap();
        let event: serde_json::Value = serde_json::from_str(first_line).unwrap();
        assert_eq!(event["type"], "content");
        assert_eq!(event["content"], "hi");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chat_not_found_fails_with_friendly_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/juben/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let output = run_against(&server, home.path(), &["chat", "ghost", "hello"]).await;

        assert!(!output.status.success());
        assert!(stderr(&output).contains("Error:"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_agents_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/juben/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "short_drama_creator", "display_name": "Short Drama Creator"}
            ])))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let output = run_against(&server, home.path(), &["agents", "--format", "json"]).await;

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        let agents: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(agents[0]["name"], "short_drama_creator");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/juben/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})),
            )
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let output = run_against(&server, home.path(), &["health"]).await;

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert!(stdout(&output).contains("healthy"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_export_writes_output_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/juben/export/content"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "export_format": "txt",
                "total_items": 2,
                "exported_data": "Act one\nAct two",
                "filename": "script.txt"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        let target = home.path().join("script.txt");
        let target_arg = target.to_string_lossy().to_string();
        let output = run_against(
            &server,
            home.path(),
            &["export", "s-1", "--output", &target_arg],
        )
        .await;

        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "Act one\nAct two");
        assert!(stdout(&output).contains("2 items"));
    }
}
