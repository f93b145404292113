use clap::Parser;
use runwatch::cli::Cli;
use runwatch::config::{Config, DestinationKind, NotifyMode, OutputMode, SplitMode, TextSelect};
use runwatch::notification::http::build_client;
use serial_test::serial;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::test_utils::write_temp_file;

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["runwatch"];
    argv.extend_from_slice(args);
    argv.extend_from_slice(&["--", "true"]);
    Cli::try_parse_from(argv).unwrap()
}

const TOML_CONFIG: &str = r#"
log_level = "debug"
output_mode = "sort-dedup"

[transport]
proxy = "socks5://127.0.0.1:1080"
timeout_secs = 10

[notify]
callbacks = ["slack", "telegram"]
notify_each = "5m"
mode = "summary"

[notify.text]
select = "tail"
tail_lines = 50

[notify.attach]
split_mode = "tail"

[notify.attach.part_max_bytes]
slack = 1000000

[notify.alerts]
patterns = ["panic", "ERROR"]

[slack]
webhook_url = "https://hooks.slack.example/base"

[telegram]
bot_token = "123:abc"
chat_id = "42"

[profiles.ci.notify]
mode = "attach-only"

[profiles.ci.slack]
webhook_url = "https://hooks.slack.example/ci"
"#;

#[test]
#[serial]
fn test_toml_file_overrides_defaults() {
    let (_dir, path) = write_temp_file("runwatch.toml", TOML_CONFIG);
    let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.output_mode, OutputMode::SortDedup);
    assert_eq!(config.transport.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
    assert_eq!(config.transport.timeout_secs, 10);
    assert_eq!(
        config.notify.callbacks,
        vec![DestinationKind::Slack, DestinationKind::Telegram]
    );
    assert_eq!(config.notify.mode, NotifyMode::Summary);
    assert_eq!(config.notify.text.select, TextSelect::Tail);
    assert_eq!(config.notify.text.tail_lines, 50);
    // Untouched keys keep their defaults.
    assert_eq!(config.notify.text.head_lines, 200);
    assert_eq!(config.notify.attach.split_mode, SplitMode::Tail);
    assert_eq!(config.notify.attach.part_max_bytes.get("slack"), Some(&1_000_000));
    assert_eq!(config.notify.alerts.patterns, vec!["panic", "ERROR"]);
    assert_eq!(config.notify.alerts.include_context_lines, 25);
    assert_eq!(config.telegram.chat_id.as_deref(), Some("42"));
    assert_eq!(config.telegram.parse_mode, "MarkdownV2");
}

#[test]
#[serial]
fn test_profile_is_merged_over_the_file() {
    let (_dir, path) = write_temp_file("runwatch.toml", TOML_CONFIG);
    let config =
        Config::load(&cli(&["--config", path.to_str().unwrap(), "--profile", "ci"])).unwrap();

    assert_eq!(config.notify.mode, NotifyMode::AttachOnly);
    assert_eq!(
        config.slack.webhook_url.as_deref(),
        Some("https://hooks.slack.example/ci")
    );
    // Keys the profile does not mention come from the base file.
    assert_eq!(config.notify.text.tail_lines, 50);
}

#[test]
#[serial]
fn test_unknown_profile_fails() {
    let (_dir, path) = write_temp_file("runwatch.toml", TOML_CONFIG);
    let err = Config::load(&cli(&["--config", path.to_str().unwrap(), "--profile", "nope"]))
        .unwrap_err();
    assert!(err.to_string().contains("Profile 'nope' not found"));
}

#[test]
#[serial]
fn test_yaml_file_is_supported() {
    let yaml = r#"
notify:
  callbacks: [discord]
  notify_each: 30s
  filters:
    include: ["^build"]
discord:
  webhook_url: https://discord.example/hook
"#;
    let (_dir, path) = write_temp_file("runwatch.yaml", yaml);
    let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

    assert_eq!(config.notify.callbacks, vec![DestinationKind::Discord]);
    assert_eq!(
        config.notify.interval().unwrap(),
        Some(std::time::Duration::from_secs(30))
    );
    assert_eq!(config.notify.filters.include, vec!["^build"]);
    assert_eq!(
        config.discord.webhook_url.as_deref(),
        Some("https://discord.example/hook")
    );
}

#[test]
#[serial]
fn test_environment_overrides_file_and_cli_overrides_environment() {
    let (_dir, path) = write_temp_file("runwatch.toml", TOML_CONFIG);
    std::env::set_var("RUNWATCH_NOTIFY__MODE", "text-only");
    std::env::set_var("RUNWATCH_LOG_LEVEL", "warn");

    let from_env = Config::load(&cli(&["--config", path.to_str().unwrap()]));
    let from_cli = Config::load(&cli(&[
        "--config",
        path.to_str().unwrap(),
        "--notify-mode",
        "auto",
    ]));

    std::env::remove_var("RUNWATCH_NOTIFY__MODE");
    std::env::remove_var("RUNWATCH_LOG_LEVEL");

    let from_env = from_env.unwrap();
    assert_eq!(from_env.notify.mode, NotifyMode::TextOnly);
    assert_eq!(from_env.log_level, "warn");
    assert_eq!(from_cli.unwrap().notify.mode, NotifyMode::Auto);
}

#[test]
#[serial]
fn test_invalid_values_fail_at_load() {
    let bad_duration = Config::load(&cli(&["--notify-each", "5 minutes"]));
    assert!(bad_duration.is_err());

    let bad_mode = Config::load(&cli(&["--notify-mode", "loud"]));
    assert!(bad_mode.is_err());

    let (_dir, path) = write_temp_file("runwatch.ini", "x = 1");
    let bad_ext = Config::load(&cli(&["--config", path.to_str().unwrap()]));
    assert!(bad_ext.is_err());
}

#[test]
#[serial]
fn test_missing_file_fails() {
    let err = Config::load(&cli(&["--config", "/nonexistent/runwatch.toml"])).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
#[serial]
fn test_unknown_attachment_limit_key_fails() {
    let err = Config::load(&cli(&["--attach-max-bytes", "discrod=100"])).unwrap_err();
    assert!(format!("{:#}", err).contains("discrod"));

    let config = Config::load(&cli(&["--attach-max-bytes", "discord=100"])).unwrap();
    assert_eq!(config.notify.attach.part_max_bytes.get("discord"), Some(&100));
}

#[tokio::test]
#[serial]
async fn test_ignore_env_proxy_bypasses_proxy_variables() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    for var in ["NO_PROXY", "no_proxy"] {
        std::env::remove_var(var);
    }
    // Nothing listens on the discard port.
    std::env::set_var("HTTP_PROXY", "http://127.0.0.1:9");
    std::env::set_var("http_proxy", "http://127.0.0.1:9");

    let direct = Config::load(&cli(&["--ignore-env-proxy"])).map(|c| build_client(&c.transport));
    let proxied = build_client(&Config::default().transport);

    std::env::remove_var("HTTP_PROXY");
    std::env::remove_var("http_proxy");

    let direct = direct.unwrap().unwrap();
    let response = direct.get(server.uri()).send().await.unwrap();
    assert!(response.status().is_success());

    assert!(proxied.unwrap().get(server.uri()).send().await.is_err());
}
