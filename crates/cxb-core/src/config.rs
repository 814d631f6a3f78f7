use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// What to do with updates that match no intent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnrecognizedPolicy {
    /// Acknowledge the webhook without replying.
    #[default]
    Silent,
    /// Reply with the catalog's `fallback_text`.
    Fallback,
}

impl UnrecognizedPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" | "ignore" | "none" => Some(Self::Silent),
            "fallback" | "reply" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Typed runtime configuration, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub webhook_secret: Option<String>,

    // HTTP transport
    pub host: String,
    pub port: u16,
    pub webhook_path: String,

    // Storage / copy
    pub contact_storage_path: PathBuf,
    pub texts_path: PathBuf,

    // Conversion
    pub soffice_path: Option<PathBuf>,
    pub conversion_timeout: Duration,
    pub temp_dir: PathBuf,
    pub max_document_bytes: u64,

    // Behavior
    pub unrecognized_policy: UnrecognizedPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let webhook_secret = env_str("TELEGRAM_WEBHOOK_SECRET").and_then(non_empty);

        let host = env_str("HOST")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_port(env_str("PORT"));
        let webhook_path = normalize_route(
            &env_str("WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string()),
        );

        let cwd = env::current_dir()?;
        let contact_storage_path = resolve_against(
            &cwd,
            env_path("CONTACT_STORAGE_PATH")
                .unwrap_or_else(|| PathBuf::from("authorized_contacts.jsonl")),
        );
        let texts_path = resolve_against(
            &cwd,
            env_path("TEXTS_PATH").unwrap_or_else(|| PathBuf::from("texts.json")),
        );

        // The override is kept even if it does not exist; the converter reports
        // that as a missing binary at conversion time instead of refusing to boot.
        let soffice_path = env_path("SOFFICE_PATH");
        let conversion_timeout =
            Duration::from_millis(env_u64("CONVERSION_TIMEOUT_MS").unwrap_or(60_000));
        let temp_dir = env_path("TEMP_DIR").unwrap_or_else(|| env::temp_dir().join("cxb"));
        fs::create_dir_all(&temp_dir)?;

        let max_document_bytes = env_u64("MAX_DOCUMENT_BYTES").unwrap_or(20 * 1024 * 1024);

        let unrecognized_policy = match env_str("UNRECOGNIZED_POLICY") {
            None => UnrecognizedPolicy::default(),
            Some(raw) => UnrecognizedPolicy::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "UNRECOGNIZED_POLICY must be `silent` or `fallback`, got `{raw}`"
                ))
            })?,
        };

        Ok(Self {
            telegram_bot_token,
            webhook_secret,
            host,
            port,
            webhook_path,
            contact_storage_path,
            texts_path,
            soffice_path,
            conversion_timeout,
            temp_dir,
            max_document_bytes,
            unrecognized_policy,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Missing or malformed values fall back to the default port.
fn parse_port(raw: Option<String>) -> u16 {
    raw.and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/webhook".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn resolve_against(base: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Seed the environment from a `.env` file; existing variables win.
pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Look up an executable by name on `PATH`.
pub fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_on_garbage() {
        assert_eq!(parse_port(None), DEFAULT_PORT);
        assert_eq!(parse_port(Some("".to_string())), DEFAULT_PORT);
        assert_eq!(parse_port(Some("eighty".to_string())), DEFAULT_PORT);
        assert_eq!(parse_port(Some(" 8443 ".to_string())), 8443);
    }

    #[test]
    fn routes_are_normalized() {
        assert_eq!(normalize_route("webhook"), "/webhook");
        assert_eq!(normalize_route("/hook/"), "/hook");
        assert_eq!(normalize_route("  "), "/webhook");
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(
            UnrecognizedPolicy::parse("Fallback"),
            Some(UnrecognizedPolicy::Fallback)
        );
        assert_eq!(
            UnrecognizedPolicy::parse("silent"),
            Some(UnrecognizedPolicy::Silent)
        );
        assert_eq!(UnrecognizedPolicy::parse("loud"), None);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/bot");
        assert_eq!(
            resolve_against(base, PathBuf::from("contacts.jsonl")),
            PathBuf::from("/srv/bot/contacts.jsonl")
        );
        assert_eq!(
            resolve_against(base, PathBuf::from("/var/lib/c.jsonl")),
            PathBuf::from("/var/lib/c.jsonl")
        );
    }
}
