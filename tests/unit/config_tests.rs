// Configuration loading tests against files on disk

use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

use imagist::config::{Config, LogFormat};
use imagist::handler::ImageProxy;
use imagist::transform::MimeType;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(yaml.as_bytes()).expect("Failed to write config");
    file
}

#[test]
fn test_from_file_with_all_sections() {
    let images = TempDir::new().unwrap();
    let yaml = format!(
        r#"
server:
  address: "127.0.0.1"
  port: 18081
  threads: 2
source:
  tls: true
  local_root: "{}"
  fetch:
    connect_timeout_secs: 3
    first_byte_timeout_secs: 7
    max_redirects: 0
transform:
  default_quality: 65
  trim_threshold: 25
  accepted_types: [jpeg, png]
  sniff_window: 64
  max_output_width: 2048
  output_chunk_size: 4096
logging:
  level: "imagist=debug"
  format: pretty
"#,
        images.path().display()
    );
    let file = write_config(&yaml);

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.server.listen_addr(), "127.0.0.1:18081");
    assert_eq!(config.server.threads, 2);
    assert_eq!(config.source.local_root, Some(PathBuf::from(images.path())));
    assert_eq!(config.source.fetch.first_byte_timeout_secs, 7);
    assert_eq!(config.source.fetch.max_redirects, 0);
    assert!(config.source.fetch.user_agent.starts_with("imagist/"));
    assert_eq!(config.transform.accepted_types, vec![MimeType::Jpeg, MimeType::Png]);
    assert_eq!(config.transform.parse_options().trim_threshold, 25);
    assert_eq!(config.transform.max_output_width, 2048);
    assert_eq!(config.transform.max_output_height, 4096);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_from_file_missing() {
    let err = Config::from_file("/definitely/not/here/config.yaml").unwrap_err();
    assert!(err.contains("Failed to read config file"));
}

#[test]
fn test_from_file_malformed_yaml() {
    let file = write_config("server: [not, a, map");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_env_substitution_in_allowed_hosts() {
    std::env::set_var("IMAGIST_UNIT_ALLOWED_HOST", "cdn.example.net");
    let file = write_config("source:\n  allowed_hosts:\n    - ${IMAGIST_UNIT_ALLOWED_HOST}\n");

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.source.allowed_hosts, vec!["cdn.example.net".to_string()]);
}

#[test]
fn test_validate_reports_zero_port() {
    let file = write_config("server:\n  port: 0\n");
    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().unwrap_err().contains("server.port"));
}

#[test]
fn test_default_config_builds_a_handler() {
    let config = Config::default();
    let proxy = ImageProxy::from_config(&config).unwrap();
    assert_eq!(proxy.parse_options().default_quality, 80);
    assert!(proxy.parse_options().content_aware_requires_cover);
}
