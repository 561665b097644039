use std::env;
use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF, meaningless for host builds
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    println!("cargo:rerun-if-changed=wifi_config.h");
    println!("cargo:rerun-if-env-changed=FOTA_FIRMWARE_TYPE");
    println!("cargo:rerun-if-env-changed=FOTA_FIRMWARE_VERSION");

    // Read device configuration if it exists
    let config_path = "wifi_config.h";
    let contents = if Path::new(config_path).exists() {
        fs::read_to_string(config_path)?
    } else {
        println!("cargo:warning=wifi_config.h not found! Copy wifi_config.h.example to wifi_config.h and add your credentials.");
        String::new()
    };

    for key in ["WIFI_SSID", "WIFI_PASSWORD", "FOTA_CHECK_URL", "FOTA_TRACK_URL"] {
        let value = define_value(&contents, key).unwrap_or_default();
        println!("cargo:rustc-env={}={}", key, value);
    }

    let firmware_type = env::var("FOTA_FIRMWARE_TYPE")
        .unwrap_or_else(|_| env::var("CARGO_PKG_NAME").unwrap_or_default());
    println!("cargo:rustc-env=FOTA_FIRMWARE_TYPE={}", firmware_type);

    let firmware_version = match env::var("FOTA_FIRMWARE_VERSION") {
        Ok(v) => v.trim().parse::<u32>().map_err(|_| {
            anyhow::anyhow!("FOTA_FIRMWARE_VERSION must be a plain integer such as 10402, got '{}'", v)
        })?,
        Err(_) => numeric_version(&env::var("CARGO_PKG_VERSION")?),
    };
    println!("cargo:rustc-env=FOTA_FIRMWARE_VERSION={}", firmware_version);

    Ok(())
}

// `#define KEY "value"` lines
fn define_value(contents: &str, key: &str) -> Option<String> {
    let marker = format!("#define {}", key);
    contents
        .lines()
        .find(|l| l.trim_start().starts_with(&marker))
        .and_then(|l| l.split('"').nth(1))
        .map(str::to_string)
}

// 1.4.2 -> 10402, the integer the update server compares against
fn numeric_version(version: &str) -> u32 {
    let mut parts = version
        .split(|c: char| c == '.' || c == '-' || c == '+')
        .map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    major * 10_000 + minor * 100 + patch
}
