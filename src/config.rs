use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

use crate::authenticator::AuthenticatorConfig;
use crate::jwks::{DEFAULT_KEY_TTL_SECONDS, VerifierConfig};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HYDRATOR_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "hydrator.json";

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_scopes_reload_seconds() -> u64 {
    60
}

fn default_key_ttl_seconds() -> u64 {
    DEFAULT_KEY_TTL_SECONDS
}

fn default_cleanup_seconds() -> u64 {
    60
}

fn default_refresh_seconds() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratorConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Scopes document with `scopesPerConsumerType`.
    pub scopes_path: String,
    #[serde(default = "default_scopes_reload_seconds")]
    pub scopes_reload_seconds: u64,

    pub tenants_path: String,
    pub system_auths_path: String,
    pub static_users_path: String,
    pub static_groups_path: String,
    /// Runtimes served by `/runtime-mappings`. Without it every runtime
    /// token is unknown.
    #[serde(default)]
    pub runtimes_path: Option<String>,

    #[serde(default)]
    pub authenticators: Vec<AuthenticatorConfig>,

    #[serde(default)]
    pub authn_jwks: PerKeyJwksConfig,

    /// Protects the admin endpoints when present.
    #[serde(default)]
    pub admin_auth: Option<AdminAuthConfig>,
}

/// Per-key JWKS cache used to verify authenticator tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerKeyJwksConfig {
    #[serde(default = "default_key_ttl_seconds")]
    pub key_ttl_seconds: u64,
    #[serde(default = "default_cleanup_seconds")]
    pub cleanup_seconds: u64,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

impl Default for PerKeyJwksConfig {
    fn default() -> Self {
        Self {
            key_ttl_seconds: default_key_ttl_seconds(),
            cleanup_seconds: default_cleanup_seconds(),
            verifier: VerifierConfig::default(),
        }
    }
}

/// Whole-set JWKS used by the admin middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAuthConfig {
    /// `http(s)://` or `file://` location of the JWK set.
    pub jwks_url: String,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

/// Config file location: explicit path, then `HYDRATOR_CONFIG`, then
/// `./hydrator.json`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    if let Ok(p) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find {} (set {} or pass --config)",
        DEFAULT_CONFIG_FILE,
        CONFIG_ENV
    ))
}

/// Replace `${NAME}` with the value of the environment variable. Unknown
/// variables are left verbatim.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match env::var(&name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

impl HydratorConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: HydratorConfig = serde_json::from_str(raw)?;
        Ok(cfg.expanded())
    }

    fn expanded(mut self) -> Self {
        for path in [
            &mut self.bind,
            &mut self.scopes_path,
            &mut self.tenants_path,
            &mut self.system_auths_path,
            &mut self.static_users_path,
            &mut self.static_groups_path,
        ] {
            *path = expand_env_vars(path);
        }
        if let Some(path) = self.runtimes_path.as_mut() {
            *path = expand_env_vars(path);
        }
        if let Some(admin) = self.admin_auth.as_mut() {
            admin.jwks_url = expand_env_vars(&admin.jwks_url);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "scopesPath": "scopes.json",
        "tenantsPath": "tenants.json",
        "systemAuthsPath": "system_auths.json",
        "staticUsersPath": "static_users.json",
        "staticGroupsPath": "static_groups.json"
    }"#;

    #[test]
    fn test_defaults() {
        let cfg = HydratorConfig::from_json(MINIMAL).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert_eq!(cfg.scopes_reload_seconds, 60);
        assert_eq!(cfg.authn_jwks.key_ttl_seconds, 300);
        assert_eq!(cfg.authn_jwks.cleanup_seconds, 60);
        assert!(cfg.authenticators.is_empty());
        assert!(cfg.admin_auth.is_none());
        assert!(cfg.runtimes_path.is_none());
    }

    #[test]
    fn test_runtimes_path_is_expanded() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("HYDRATOR_TEST_RUNTIMES_DIR", "/srv/rt") };
        let raw = MINIMAL.replace(
            "\"scopesPath\"",
            r#""runtimesPath": "${HYDRATOR_TEST_RUNTIMES_DIR}/runtimes.json", "scopesPath""#,
        );
        let cfg = HydratorConfig::from_json(&raw).unwrap();
        assert_eq!(cfg.runtimes_path.as_deref(), Some("/srv/rt/runtimes.json"));
    }

    #[test]
    fn test_admin_auth_defaults_refresh_period() {
        let raw = MINIMAL.replace(
            "\"scopesPath\"",
            r#""adminAuth": {"jwksUrl": "file:///etc/jwks.json", "verifier": {"issuer": "ops"}}, "scopesPath""#,
        );
        let cfg = HydratorConfig::from_json(&raw).unwrap();
        let admin = cfg.admin_auth.unwrap();
        assert_eq!(admin.refresh_seconds, 300);
        assert_eq!(admin.verifier.issuer.as_deref(), Some("ops"));
    }

    #[test]
    fn test_missing_required_path_is_error() {
        assert!(HydratorConfig::from_json(r#"{"scopesPath": "s.json"}"#).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("HYDRATOR_TEST_DATA_DIR", "/srv/data") };
        assert_eq!(
            expand_env_vars("${HYDRATOR_TEST_DATA_DIR}/tenants.json"),
            "/srv/data/tenants.json"
        );
        assert_eq!(
            expand_env_vars("${HYDRATOR_TEST_UNSET_VAR}/x"),
            "${HYDRATOR_TEST_UNSET_VAR}/x"
        );
        assert_eq!(expand_env_vars("$HOME"), "$HOME");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydrator.json");
        fs::write(&path, MINIMAL).unwrap();

        let cfg = HydratorConfig::load(&path).unwrap();
        assert_eq!(cfg.tenants_path, "tenants.json");
        assert_eq!(resolve_config_path(Some(path.clone())).unwrap(), path);
    }
}
