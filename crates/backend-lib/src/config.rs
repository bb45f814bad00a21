// ============================
// crates/backend-lib/src/config.rs
// ============================

//! Configuration management.
//!
//! Settings are layered: compiled-in defaults, then an optional
//! `codesync.toml` next to the binary, then `CODESYNC_*` environment
//! variables. Later layers win.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Runtime configuration for the session server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,
    /// Execution engine endpoint receiving run requests.
    pub execution_endpoint: String,
    /// Per-run deadline for the execution engine, in seconds.
    pub execution_timeout_secs: u64,
    /// How long an emptied room survives before its delayed existence
    /// check fires, in seconds.
    pub cleanup_grace_secs: u64,
    /// Period of the background sweep over all rooms, in seconds.
    pub reaper_interval_secs: u64,
    /// Idle age past which an empty room is reaped, in seconds.
    pub room_idle_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().expect("static socket address"),
            execution_endpoint: "https://emkc.org/api/v2/piston/execute".to_string(),
            execution_timeout_secs: 30,
            cleanup_grace_secs: 5 * 60,
            reaper_interval_secs: 60 * 60,
            room_idle_secs: 24 * 60 * 60,
        }
    }
}

impl Settings {
    /// Loads settings from `codesync.toml` in the working directory plus
    /// the environment.
    pub fn load() -> Result<Self, AppError> {
        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file("codesync.toml")))
    }

    /// Loads settings from an explicit config file plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> Result<Self, AppError> {
        Ok(figment.merge(Env::prefixed("CODESYNC_")).extract()?)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn room_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.room_idle_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 5000);
        assert!(settings.execution_endpoint.contains("piston"));
        assert_eq!(settings.cleanup_grace(), Duration::from_secs(300));
        assert_eq!(settings.reaper_interval(), Duration::from_secs(3600));
        assert_eq!(settings.room_idle(), chrono::Duration::hours(24));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "codesync.toml",
                r#"
                    bind_addr = "127.0.0.1:9000"
                    cleanup_grace_secs = 1
                "#,
            )?;
            let settings = Settings::load().expect("settings should load");
            assert_eq!(settings.bind_addr, "127.0.0.1:9000".parse().unwrap());
            assert_eq!(settings.cleanup_grace_secs, 1);
            // untouched keys keep their defaults
            assert_eq!(settings.room_idle_secs, 86_400);
            Ok(())
        });
    }

    #[test]
    fn environment_wins_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("codesync.toml", r#"room_idle_secs = 120"#)?;
            jail.set_env("CODESYNC_ROOM_IDLE_SECS", "60");
            let settings = Settings::load().expect("settings should load");
            assert_eq!(settings.room_idle_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn explicit_path_is_honoured() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("deploy.toml", r#"execution_timeout_secs = 5"#)?;
            let settings = Settings::load_from("deploy.toml").expect("settings should load");
            assert_eq!(settings.execution_timeout(), Duration::from_secs(5));
            Ok(())
        });
    }
}
