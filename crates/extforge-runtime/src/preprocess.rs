//! Text transforms applied while files move from the source tree to the outputs.

use std::path::Path;

/// Rewrites quoted references to source files in markup so they point at the
/// bundled output, e.g. `<script src="./popup.module.ts">` → `./popup.module.js`.
#[derive(Debug, Clone)]
pub struct ImportRewriter {
    rules: Vec<(String, String)>,
}

impl ImportRewriter {
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self { rules }
    }

    /// Every source extension maps to `.js`.
    pub fn for_source_extensions(extensions: &[String]) -> Self {
        Self::new(
            extensions
                .iter()
                .map(|ext| (ext.clone(), ".js".to_owned()))
                .collect(),
        )
    }

    pub fn rewrite(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(['"', '\'']) {
            let quote = rest[start..].chars().next().unwrap_or('"');
            out.push_str(&rest[..=start]);
            rest = &rest[start + 1..];
            let Some(end) = rest.find(quote) else {
                break;
            };
            out.push_str(&self.rewrite_reference(&rest[..end]));
            out.push(quote);
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn rewrite_reference(&self, reference: &str) -> String {
        if reference.is_empty() || reference.contains(char::is_whitespace) {
            return reference.to_owned();
        }
        for (from, to) in &self.rules {
            if let Some(stem) = reference.strip_suffix(from.as_str()) {
                if !stem.is_empty() {
                    return format!("{stem}{to}");
                }
            }
        }
        reference.to_owned()
    }
}

/// Wraps bundled script outputs (`*.script.js`) in an immediately-invoked
/// function so their top-level bindings stay out of the page scope.
#[derive(Debug, Clone)]
pub struct IifeWrapper {
    file_suffixes: Vec<String>,
}

impl IifeWrapper {
    /// `script_suffixes` as configured (`.script`); outputs end in `<suffix>.js`.
    pub fn for_script_suffixes(script_suffixes: &[String]) -> Self {
        Self {
            file_suffixes: script_suffixes.iter().map(|s| format!("{s}.js")).collect(),
        }
    }

    pub fn applies_to(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        self.file_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    pub fn wrap(&self, content: &str) -> String {
        format!("(() => {{\n{}\n}})();\n", content.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> ImportRewriter {
        ImportRewriter::for_source_extensions(&[".ts".to_owned(), ".tsx".to_owned()])
    }

    #[test]
    fn script_src_is_rewritten() {
        let html = r#"<script type="module" src="./popup.module.ts"></script>"#;
        assert_eq!(
            rewriter().rewrite(html),
            r#"<script type="module" src="./popup.module.js"></script>"#
        );
    }

    #[test]
    fn single_quotes_and_tsx_are_rewritten() {
        assert_eq!(
            rewriter().rewrite("import x from './view.tsx';"),
            "import x from './view.js';"
        );
    }

    #[test]
    fn unrelated_strings_are_untouched() {
        let html = r#"<p title="types.ts are great">x</p><a href="page.html">ts</a>"#;
        assert_eq!(rewriter().rewrite(html), html);
    }

    #[test]
    fn unterminated_quote_keeps_text() {
        let text = r#"<a href="x.ts"#;
        assert_eq!(rewriter().rewrite(text), text);
    }

    #[test]
    fn bare_extension_is_not_rewritten() {
        assert_eq!(rewriter().rewrite(r#"".ts""#), r#"".ts""#);
    }

    #[test]
    fn iife_wrapper_matches_script_outputs() {
        let wrapper = IifeWrapper::for_script_suffixes(&[".script".to_owned()]);
        assert!(wrapper.applies_to(Path::new("content_scripts/content.script.js")));
        assert!(!wrapper.applies_to(Path::new("background.module.js")));
        assert_eq!(wrapper.wrap("let a = 1;\n"), "(() => {\nlet a = 1;\n})();\n");
    }
}
