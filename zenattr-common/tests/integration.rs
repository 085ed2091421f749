//! Integration tests for zenattr-common library.

use std::io::Write;

use serde::Deserialize;
use zenattr_common::{
    AttributeKeys, BridgeConfig, BridgeStatus, Format, LogFormat, LoggingConfig, ZenohConfig,
    decode, encode,
};

#[derive(Debug, Deserialize)]
struct DeviceConfig {
    #[serde(default)]
    zenoh: ZenohConfig,
    #[serde(default)]
    logging: LoggingConfig,
    device: String,
}

impl BridgeConfig for DeviceConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        zenattr_common::KEY_PREFIX
    }

    fn validate(&self) -> zenattr_common::Result<()> {
        if zenattr_common::is_valid_chunk(&self.device) {
            Ok(())
        } else {
            Err(zenattr_common::Error::Config(format!(
                "invalid device '{}'",
                self.device
            )))
        }
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_load_and_validate_config_file() {
    let file = write_config(
        r#"{
            // comments and trailing commas are JSON5
            zenoh: { mode: "client", connect: ["tcp/127.0.0.1:7447"], },
            logging: { level: "debug", format: "json" },
            device: "drive01",
        }"#,
    );

    let config = DeviceConfig::load(file.path()).expect("config loads");
    assert_eq!(config.zenoh().mode, "client");
    assert_eq!(config.logging().format, LogFormat::Json);
    assert_eq!(config.format(), Format::Json);

    let keys = AttributeKeys::new(&config.device);
    assert_eq!(keys.attribute("temp"), "zenattr/fieldbus/drive01/attr/temp");
}

#[test]
fn test_load_rejects_invalid_config() {
    let file = write_config(r#"{ device: "drive/01" }"#);
    assert!(DeviceConfig::load(file.path()).is_err());

    let file = write_config("{ device: ");
    assert!(DeviceConfig::load(file.path()).is_err());

    assert!(DeviceConfig::load("/nonexistent/fieldbus.json5").is_err());
}

#[test]
fn test_status_round_trip_both_formats() {
    let status = BridgeStatus::running("fieldbus", "0.1.0")
        .with_metadata(serde_json::json!({ "device": "drive01", "attributes": ["flag", "temp"] }));

    for format in [Format::Json, Format::Cbor] {
        let bytes = encode(&status, format).expect("encode");
        let decoded: BridgeStatus = decode(&bytes, format).expect("decode");

        assert_eq!(decoded.status, "running");
        assert_eq!(decoded.metadata["device"], "drive01");
        assert_eq!(decoded.metadata["attributes"][1], "temp");
    }
}
