//! Topology derivation from fixture snapshots

use indico_config::{Channel, ChannelPayload, OperatorConfig, ProxyEnvironment};
use indico_test_utils::{
    federated_auth_payload, mail_relay_payload, mandatory_inputs, mandatory_snapshot,
    object_storage_payload, replica, singleton_on, snapshot_of, CACHE_URL, DB_URI, QUEUE_URL,
};
use indico_topology::{
    containers, InstalledPlugins, TopologyBuilder, TopologyError, TopologyInputs, WORKER_SERVICE,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::Value;

fn env_of(snapshot: &indico_config::ConfigurationSnapshot, plugins: &InstalledPlugins) -> std::collections::BTreeMap<String, String> {
    let local = replica(0);
    let singleton = singleton_on(Some(&local));
    TopologyBuilder::new()
        .environment(&TopologyInputs {
            snapshot,
            replica: &local,
            singleton: &singleton,
            plugins,
        })
        .unwrap()
}

#[test]
fn mandatory_dependencies_only() {
    let env = env_of(&mandatory_snapshot(), &InstalledPlugins::new());

    assert_eq!(env["DB_URI"], DB_URI);
    assert_eq!(env["CACHE_URL"], CACHE_URL);
    assert_eq!(env["QUEUE_URL"], QUEUE_URL);
    assert_eq!(env["ATTACHMENT_STORAGE"], "default");
    assert_eq!(env["STORAGE_DICT"], r#"{"default":"fs:/srv/indico/archive"}"#);
    assert_eq!(env["SMTP_SERVER"], "");
    assert_eq!(env["SMTP_PORT"], "25");
    assert_eq!(env["SMTP_USE_TLS"], "false");
    assert_eq!(env["SERVICE_HOSTNAME"], "indico.local");
    assert_eq!(env["SERVICE_SCHEME"], "http");
    assert!(!env.contains_key("SERVICE_PORT"));
    assert!(!env.contains_key("INDICO_AUTH_PROVIDERS"));
    assert!(!env.contains_key("HTTP_PROXY"));
}

#[test]
fn object_storage_adds_second_backend() {
    let inputs = mandatory_inputs().with_payload(Channel::ObjectStorage, object_storage_payload());
    let env = env_of(&snapshot_of(&inputs), &InstalledPlugins::new());

    let storage: Value = serde_json::from_str(&env["STORAGE_DICT"]).unwrap();
    assert_eq!(storage["default"], "fs:/srv/indico/archive");
    assert_eq!(storage["s3"], "s3:bucket=b,access_key=a,secret_key=s,proxy=true");
    assert_eq!(storage.as_object().unwrap().len(), 2);
    assert_eq!(env["ATTACHMENT_STORAGE"], "s3");
}

#[test]
fn mail_relay_fields() {
    let inputs = mandatory_inputs().with_payload(Channel::MailRelay, mail_relay_payload());
    let env = env_of(&snapshot_of(&inputs), &InstalledPlugins::new());

    assert_eq!(env["SMTP_SERVER"], "smtp.example.com");
    assert_eq!(env["SMTP_PORT"], "587");
    assert_eq!(env["SMTP_LOGIN"], "mailer");
    assert_eq!(env["SMTP_PASSWORD"], "hunter2");
    assert_eq!(env["SMTP_USE_TLS"], "true");
}

#[test]
fn federated_auth_block() {
    let options = OperatorConfig::new().with_site_url("https://events.example.com");
    let inputs = mandatory_inputs()
        .with_options(options)
        .with_payload(Channel::FederatedAuth, federated_auth_payload());
    let env = env_of(&snapshot_of(&inputs), &InstalledPlugins::new());

    let auth: Value = serde_json::from_str(&env["INDICO_AUTH_PROVIDERS"]).unwrap();
    let saml = &auth["ubuntu"]["saml_config"];
    assert_eq!(auth["ubuntu"]["type"], "saml");
    assert_eq!(saml["strict"], true);
    assert_eq!(saml["sp"]["entityId"], "https://events.example.com");
    assert_eq!(saml["idp"]["entityId"], "https://login.ubuntu.com");
    assert_eq!(saml["idp"]["x509cert"], "MIICjzCCAfigAwIBAgIJALNN");
    assert_eq!(saml["idp"]["singleSignOnService"]["url"], "https://login.ubuntu.com/saml/");
    assert!(saml["idp"]["singleSignOnService"].get("response_url").is_none());
    assert_eq!(
        saml["idp"]["singleLogoutService"]["response_url"],
        "https://login.ubuntu.com/+logout-done"
    );

    let identity: Value = serde_json::from_str(&env["INDICO_IDENTITY_PROVIDERS"]).unwrap();
    assert_eq!(identity["ubuntu"]["type"], "saml");
    assert_eq!(identity["ubuntu"]["trusted_email"], true);
    assert_eq!(identity["ubuntu"]["mapping"]["first_name"], "fullname");
    assert_eq!(identity["ubuntu"]["identifier_field"], "openid");
}

#[test]
fn groups_plugin_changes_identity_provider_type() {
    let inputs = mandatory_inputs().with_payload(Channel::FederatedAuth, federated_auth_payload());
    let plugins: InstalledPlugins = ["anonymize", "saml_groups"].into_iter().collect();
    let env = env_of(&snapshot_of(&inputs), &plugins);

    let identity: Value = serde_json::from_str(&env["INDICO_IDENTITY_PROVIDERS"]).unwrap();
    assert_eq!(identity["ubuntu"]["type"], "saml_groups");
    let auth: Value = serde_json::from_str(&env["INDICO_AUTH_PROVIDERS"]).unwrap();
    assert_eq!(auth["ubuntu"]["type"], "saml");
    assert_eq!(env["INDICO_EXTRA_PLUGINS"], "anonymize,saml_groups");
}

#[test]
fn leader_host_wins_for_cache_url() {
    let cache = ChannelPayload::replica([("hostname", "cache-host-1"), ("port", "1011")])
        .with_cluster("leader-host", "cache-host");
    let inputs = mandatory_inputs().with_payload(Channel::Cache, cache);
    let env = env_of(&snapshot_of(&inputs), &InstalledPlugins::new());
    assert_eq!(env["CACHE_URL"], "redis://cache-host:1011");
}

#[test]
fn proxy_variables_only_when_set() {
    let proxy = ProxyEnvironment {
        http_proxy: Some("http://squid.internal:3128".to_owned()),
        https_proxy: None,
        no_proxy: Some("localhost".to_owned()),
    };
    let env = env_of(&snapshot_of(&mandatory_inputs().with_proxy(proxy)), &InstalledPlugins::new());
    assert_eq!(env["HTTP_PROXY"], "http://squid.internal:3128");
    assert_eq!(env["NO_PROXY"], "localhost");
    assert!(!env.contains_key("HTTPS_PROXY"));
}

#[test]
fn worker_only_on_holder() {
    let snapshot = mandatory_snapshot();
    let plugins = InstalledPlugins::new();
    let holder = replica(0);
    let other = replica(1);
    let singleton = singleton_on(Some(&holder));
    let builder = TopologyBuilder::new();

    let on_holder = builder
        .build(&TopologyInputs {
            snapshot: &snapshot,
            replica: &holder,
            singleton: &singleton,
            plugins: &plugins,
        })
        .unwrap();
    let on_other = builder
        .build(&TopologyInputs {
            snapshot: &snapshot,
            replica: &other,
            singleton: &singleton,
            plugins: &plugins,
        })
        .unwrap();

    let holder_layer = on_holder.container(containers::INDICO).unwrap();
    let other_layer = on_other.container(containers::INDICO).unwrap();
    assert!(holder_layer.services.contains_key(WORKER_SERVICE));
    assert!(holder_layer.checks.contains_key("celery-ready"));
    assert!(!other_layer.services.contains_key(WORKER_SERVICE));
    assert_eq!(
        holder_layer.services["indico"].environment,
        holder_layer.services[WORKER_SERVICE].environment
    );
    assert_eq!(on_holder.len(), containers::ALL.len());
}

#[test]
fn exporter_points_at_queue() {
    let snapshot = mandatory_snapshot();
    let local = replica(0);
    let singleton = singleton_on(None);
    let plugins = InstalledPlugins::new();
    let topology = TopologyBuilder::new()
        .build(&TopologyInputs {
            snapshot: &snapshot,
            replica: &local,
            singleton: &singleton,
            plugins: &plugins,
        })
        .unwrap();
    let exporter = topology.container(containers::CELERY_EXPORTER).unwrap();
    assert_eq!(
        exporter.services["celery-exporter"].command,
        "celery-exporter --broker-url=redis://broker-host:1010 --port=9808"
    );
}

#[test]
fn unready_snapshot_is_refused() {
    let mut inputs = mandatory_inputs();
    inputs.payloads.remove(&Channel::Database);
    let snapshot = snapshot_of(&inputs);
    let local = replica(0);
    let singleton = singleton_on(None);
    let plugins = InstalledPlugins::new();
    let err = TopologyBuilder::new()
        .build(&TopologyInputs {
            snapshot: &snapshot,
            replica: &local,
            singleton: &singleton,
            plugins: &plugins,
        })
        .unwrap_err();
    assert!(matches!(err, TopologyError::NotReady(_)));
    assert_eq!(err.to_string(), "Waiting for database availability");
}

proptest! {
    #[test]
    fn identical_inputs_render_identically(
        with_s3 in any::<bool>(),
        with_mail in any::<bool>(),
        with_saml in any::<bool>(),
        holder in 0u32..3,
    ) {
        let mut inputs = mandatory_inputs();
        if with_s3 {
            inputs = inputs.with_payload(Channel::ObjectStorage, object_storage_payload());
        }
        if with_mail {
            inputs = inputs.with_payload(Channel::MailRelay, mail_relay_payload());
        }
        if with_saml {
            inputs = inputs.with_payload(Channel::FederatedAuth, federated_auth_payload());
        }
        let local = replica(0);
        let holder = replica(holder);
        let singleton = singleton_on(Some(&holder));
        let plugins = InstalledPlugins::new();
        let render = || {
            let snapshot = snapshot_of(&inputs);
            let topology = TopologyBuilder::new()
                .build(&TopologyInputs {
                    snapshot: &snapshot,
                    replica: &local,
                    singleton: &singleton,
                    plugins: &plugins,
                })
                .unwrap();
            (topology.to_json().unwrap(), topology.fingerprint().unwrap())
        };
        prop_assert_eq!(render(), render());
    }
}
