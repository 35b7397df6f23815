//! Loading and rendering scenario files from disk

use indico_operator::{Scenario, Validation};
use indico_topology::containers;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

const FULL: &str = r#"
replica: indico/2
role: coordinator
plugins: [saml_groups]
inputs:
  payloads:
    database:
      cluster: {username: user1, password: somepass, endpoint: "pg.local:5432", database: indico}
    redis-cache:
      replica: {hostname: cache-host-1, port: "1011"}
      cluster: {leader-host: cache-host}
    redis-broker:
      replica: {hostname: broker-host, port: "1010"}
    s3:
      cluster: {bucket: b, access-key: a, secret-key: s}
  options:
    site_url: https://events.example.com:8443
"#;

fn write(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_scenario_from_file() {
    let file = write(FULL);
    let scenario = Scenario::load(file.path()).unwrap();

    assert_eq!(scenario.replica.as_str(), "indico/2");
    assert_eq!(scenario.plugins, vec!["saml_groups".to_owned()]);
    assert_eq!(scenario.validate(), Validation::Ready);
}

#[test]
fn missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = Scenario::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"));
}

#[test]
fn invalid_port_is_reported_with_field() {
    let file = write(
        r#"
inputs:
  payloads:
    redis-broker:
      replica: {hostname: broker-host, port: "not-a-port"}
"#,
    );
    let scenario = Scenario::load(file.path()).unwrap();
    let Validation::Invalid { field, message } = scenario.validate() else {
        panic!("expected invalid configuration");
    };
    assert_eq!(field, "port");
    assert!(message.contains("not-a-port"));
}

#[tokio::test]
async fn renders_full_topology() {
    let file = write(FULL);
    let topology = Scenario::load(file.path()).unwrap().render().await.unwrap();

    assert_eq!(topology.len(), containers::ALL.len());
    let env = &topology.container(containers::INDICO).unwrap().services[containers::INDICO].environment;
    assert_eq!(env["CACHE_URL"], "redis://cache-host:1011");
    assert_eq!(env["SERVICE_HOSTNAME"], "events.example.com");
    assert_eq!(env["SERVICE_PORT"], "8443");
    assert_eq!(env["ATTACHMENT_STORAGE"], "s3");
    assert_eq!(env["INDICO_EXTRA_PLUGINS"], "saml_groups");

    let json = topology.to_json().unwrap();
    assert!(json.contains("celery"));
}

#[tokio::test]
async fn render_refuses_unready_scenario() {
    let file = write("inputs: {}\n");
    let err = Scenario::load(file.path()).unwrap().render().await.unwrap_err();
    assert!(err.to_string().contains("Waiting for redis-broker availability"));
}
