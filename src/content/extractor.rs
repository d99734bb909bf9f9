use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Field name for the page's meta description.
pub const DESCRIPTION: &str = "description";
/// Field name for the page's Open Graph preview image.
pub const IMAGE: &str = "image";

// A pattern that fails to compile leaves its field unextracted.
static DESCRIPTION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name\s*=\s*"description"[^>]+content\s*=\s*"([^"]+)""#).ok()
});

static IMAGE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property\s*=\s*"og:image"[^>]+content\s*=\s*"([^"]+)""#).ok()
});

/// Extracted field values keyed by field name.
///
/// Absent fields are simply missing; there is no "failed" entry.
pub type Enrichment = BTreeMap<&'static str, String>;

/// Extraction function for one field. Returns `None` when the page has no match.
pub type ExtractFn = fn(&str) -> Option<String>;

/// Ordered set of `(field, extractor)` pairs.
///
/// Each extractor runs independently on the same document, so adding a field
/// is a matter of registering one more pair.
#[derive(Clone)]
pub struct ExtractorRegistry {
    fields: Vec<(&'static str, ExtractFn)>,
}

impl ExtractorRegistry {
    /// A registry with no fields.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Register an extractor for `field`, replacing any previous one.
    pub fn register(mut self, field: &'static str, extract: ExtractFn) -> Self {
        self.fields.retain(|(name, _)| *name != field);
        self.fields.push((field, extract));
        self
    }

    /// Names of the registered fields, in registration order.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    /// Run every registered extractor against `html`.
    ///
    /// Never fails: empty or garbage input yields an empty mapping.
    pub fn extract(&self, html: &str) -> Enrichment {
        self.fields
            .iter()
            .filter_map(|(name, extract)| {
                extract(html)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (*name, v))
            })
            .collect()
    }
}

impl Default for ExtractorRegistry {
    /// The `description` and `image` fields.
    fn default() -> Self {
        Self::empty()
            .register(DESCRIPTION, extract_description)
            .register(IMAGE, extract_image)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.fields()).finish()
    }
}

/// `<meta name="description" content="...">`
pub fn extract_description(html: &str) -> Option<String> {
    first_capture(&DESCRIPTION_RE, html)
}

/// `<meta property="og:image" content="...">`
pub fn extract_image(html: &str) -> Option<String> {
    first_capture(&IMAGE_RE, html)
}

fn first_capture(re: &Option<Regex>, html: &str) -> Option<String> {
    re.as_ref()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping(pairs: &[(&'static str, &str)]) -> Enrichment {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_extract_cases() {
        let registry = ExtractorRegistry::default();
        let cases = [
            ("empty", "", mapping(&[])),
            ("no meta", "<html></html>", mapping(&[])),
            (
                "description",
                "<html>\n<meta name=\"description\" content=\"test description\">\n</html>",
                mapping(&[(DESCRIPTION, "test description")]),
            ),
            (
                "image",
                "<html>\n<meta property=\"og:image\" content=\"http://example.com/image.jpg\">\n</html>",
                mapping(&[(IMAGE, "http://example.com/image.jpg")]),
            ),
            (
                "both",
                "<html>\n<meta name=\"description\" content=\"test description\">\n\
                 <meta property=\"og:image\" content=\"http://example.com/image.jpg\">\n</html>",
                mapping(&[
                    (DESCRIPTION, "test description"),
                    (IMAGE, "http://example.com/image.jpg"),
                ]),
            ),
        ];

        for (name, html, expected) in cases {
            assert_eq!(registry.extract(html), expected, "case: {name}");
        }
    }

    #[test]
    fn test_patterns_compile() {
        assert!(DESCRIPTION_RE.is_some());
        assert!(IMAGE_RE.is_some());
    }

    #[test]
    fn test_case_insensitive_tags() {
        let html = r#"<META NAME="description" CONTENT="Shouting">"#;
        assert_eq!(extract_description(html).as_deref(), Some("Shouting"));
    }

    #[test]
    fn test_garbage_input_yields_empty_mapping() {
        let registry = ExtractorRegistry::default();
        assert!(registry.extract("\u{0}\u{1}<<<>>>meta content=").is_empty());
        assert!(registry
            .extract(r#"<meta name="description" content="">"#)
            .is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let registry = ExtractorRegistry::default();
        let html = r#"<head>
            <meta name="description" content="Same every time">
            <meta property="og:image" content="https://img.example.com/a.png">
        </head>"#;
        assert_eq!(registry.extract(html), registry.extract(html));
    }

    #[test]
    fn test_fields_do_not_affect_each_other() {
        let registry = ExtractorRegistry::default();
        let html = r#"<meta property="og:image" content="https://img.example.com/a.png">"#;
        let result = registry.extract(html);
        assert_eq!(result.len(), 1);
        assert!(!result.contains_key(DESCRIPTION));
    }

    #[test]
    fn test_registering_a_new_field_is_additive() {
        fn title(html: &str) -> Option<String> {
            let start = html.find("<title>")? + "<title>".len();
            let end = html[start..].find("</title>")? + start;
            Some(html[start..end].to_string())
        }

        let registry = ExtractorRegistry::default().register("title", title);
        assert_eq!(
            registry.fields().collect::<Vec<_>>(),
            vec![DESCRIPTION, IMAGE, "title"]
        );

        let html = r#"<title>Page</title><meta name="description" content="d">"#;
        assert_eq!(
            registry.extract(html),
            mapping(&[("title", "Page"), (DESCRIPTION, "d")])
        );
    }

    #[test]
    fn test_register_replaces_existing_field() {
        fn fixed(_: &str) -> Option<String> {
            Some("fixed".into())
        }
        let registry = ExtractorRegistry::default().register(DESCRIPTION, fixed);
        assert_eq!(registry.fields().count(), 2);
        assert_eq!(
            registry.extract("").get(DESCRIPTION).map(String::as_str),
            Some("fixed")
        );
    }
}
