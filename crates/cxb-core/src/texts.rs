//! User-facing copy.
//!
//! Every string the bot sends is looked up here by key. Operators can
//! override any key with a flat JSON object (`TEXTS_PATH`); keys that are not
//! overridden keep their built-in default.

use std::{
    collections::HashMap,
    path::Path,
    sync::OnceLock,
};

use regex::Regex;
use tracing::{debug, warn};

pub const GREETING_TEXT: &str = "greeting_text";
pub const AUTHORIZE_BUTTON_TEXT: &str = "authorize_button_text";
pub const CONTACT_SAVED_TEMPLATE: &str = "contact_saved_template";
pub const CONTACT_FALLBACK_LABEL: &str = "contact_fallback_label";
pub const CONTACT_SAVE_FAILED: &str = "contact_save_failed";
pub const CONVERSION_UNAVAILABLE: &str = "conversion_unavailable";
pub const CONVERSION_DONE_CAPTION: &str = "conversion_done_caption";
pub const DOCUMENT_TOO_LARGE: &str = "document_too_large";
pub const FALLBACK_TEXT: &str = "fallback_text";

fn builtin(key: &str) -> Option<&'static str> {
    let s = match key {
        GREETING_TEXT => {
            "Привет! Чтобы продолжить, авторизуйтесь через отправку контакта кнопкой ниже."
        }
        AUTHORIZE_BUTTON_TEXT => "Авторизоваться",
        CONTACT_SAVED_TEMPLATE => "Спасибо! {contact_label} сохранён для авторизации.",
        CONTACT_FALLBACK_LABEL => "контакт",
        CONTACT_SAVE_FAILED => "Не удалось сохранить контакт. Попробуйте ещё раз позже.",
        CONVERSION_UNAVAILABLE => {
            "Конвертация XLS в XLSX временно недоступна. Попробуйте позже."
        }
        CONVERSION_DONE_CAPTION => "Готово: {file_name}",
        DOCUMENT_TOO_LARGE => "Файл слишком большой для конвертации.",
        FALLBACK_TEXT => "Отправьте /start, чтобы начать.",
        _ => return None,
    };
    Some(s)
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").expect("valid regex"))
}

/// Key → string lookup with built-in defaults.
#[derive(Clone, Debug, Default)]
pub struct TextCatalog {
    overrides: HashMap<String, String>,
}

impl TextCatalog {
    /// Built-in copy only.
    pub fn defaults() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Load overrides from a JSON object file.
    ///
    /// A missing, unreadable or malformed file yields the defaults; non-string
    /// values are skipped.
    pub fn from_json_file(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no text overrides file, using defaults");
                return Self::defaults();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read text overrides");
                return Self::defaults();
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "text overrides are not valid JSON");
                return Self::defaults();
            }
        };

        let Some(obj) = value.as_object() else {
            warn!(path = %path.display(), "text overrides must be a JSON object");
            return Self::defaults();
        };

        let overrides = obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect::<HashMap<_, _>>();
        debug!(path = %path.display(), count = overrides.len(), "loaded text overrides");
        Self { overrides }
    }

    /// Never fails: unknown keys come back as the key itself.
    pub fn lookup(&self, key: &str) -> String {
        if let Some(v) = self.overrides.get(key) {
            return v.clone();
        }
        builtin(key).map(str::to_string).unwrap_or_else(|| key.to_string())
    }

    /// Look up `key` and substitute `{name}` placeholders.
    ///
    /// An override template naming a placeholder that `args` does not fill is
    /// discarded in favour of the built-in one. Substituted values are never
    /// rescanned, so braces in user data pass through untouched.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        let template = self.lookup(key);
        if has_unfilled_placeholder(&template, args) {
            if let Some(default) = builtin(key) {
                return render(default, args);
            }
        }
        render(&template, args)
    }
}

fn placeholder_name(m: &str) -> &str {
    &m[1..m.len() - 1]
}

fn has_unfilled_placeholder(template: &str, args: &[(&str, &str)]) -> bool {
    placeholder_re().find_iter(template).any(|m| {
        let name = placeholder_name(m.as_str());
        !args.iter().any(|(n, _)| *n == name)
    })
}

fn render(template: &str, args: &[(&str, &str)]) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let whole = &caps[0];
            let name = placeholder_name(whole);
            args.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_key_is_stable_placeholder() {
        let t = TextCatalog::defaults();
        assert_eq!(t.lookup("no_such_key"), "no_such_key");
        assert_eq!(t.lookup("no_such_key"), t.lookup("no_such_key"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let t = TextCatalog::with_overrides(HashMap::from([(
            GREETING_TEXT.to_string(),
            "Hello!".to_string(),
        )]));
        assert_eq!(t.lookup(GREETING_TEXT), "Hello!");
        assert_eq!(t.lookup(AUTHORIZE_BUTTON_TEXT), "Авторизоваться");
    }

    #[test]
    fn format_substitutes_placeholders() {
        let t = TextCatalog::with_overrides(HashMap::from([(
            CONTACT_SAVED_TEMPLATE.to_string(),
            "Сохранено: {contact_label}".to_string(),
        )]));
        assert_eq!(
            t.format(CONTACT_SAVED_TEMPLATE, &[("contact_label", "Иван Иванов")]),
            "Сохранено: Иван Иванов"
        );
    }

    #[test]
    fn broken_override_template_falls_back_to_default() {
        let t = TextCatalog::with_overrides(HashMap::from([(
            CONTACT_SAVED_TEMPLATE.to_string(),
            "Saved {name}".to_string(),
        )]));
        assert_eq!(
            t.format(CONTACT_SAVED_TEMPLATE, &[("contact_label", "A")]),
            "Спасибо! A сохранён для авторизации."
        );
    }

    #[test]
    fn braces_in_values_keep_the_override() {
        let t = TextCatalog::with_overrides(HashMap::from([(
            CONTACT_SAVED_TEMPLATE.to_string(),
            "Saved {contact_label}".to_string(),
        )]));
        assert_eq!(
            t.format(CONTACT_SAVED_TEMPLATE, &[("contact_label", "{vip}")]),
            "Saved {vip}"
        );
        assert_eq!(
            t.format(
                CONVERSION_DONE_CAPTION,
                &[("file_name", "{contact_label}.xlsx"), ("contact_label", "x")]
            ),
            "Готово: {contact_label}.xlsx"
        );
    }

    #[test]
    fn json_file_overrides_and_skips_non_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texts.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"greeting_text": "Здравствуйте!", "authorize_button_text": 5}}"#
        )
        .unwrap();

        let t = TextCatalog::from_json_file(&path);
        assert_eq!(t.lookup(GREETING_TEXT), "Здравствуйте!");
        assert_eq!(t.lookup(AUTHORIZE_BUTTON_TEXT), "Авторизоваться");
    }

    #[test]
    fn missing_or_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = TextCatalog::from_json_file(&dir.path().join("absent.json"));
        assert_eq!(
            missing.lookup(GREETING_TEXT),
            builtin(GREETING_TEXT).unwrap()
        );

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2, 3]").unwrap();
        let t = TextCatalog::from_json_file(&bad);
        assert_eq!(t.lookup(GREETING_TEXT), builtin(GREETING_TEXT).unwrap());
    }
}
