//! Template context: the payload every page renders against.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RenderError;

/// `site` is the whole configuration map (including any injected
/// parameters such as `baseurl`); `page` describes the page being rendered.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub site: Map<String, Value>,
    pub page: PageCtx,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageCtx {
    /// Source-relative path with forward slashes.
    pub path: String,
    /// Site-absolute URL, prefixed with `baseurl` when one is set.
    pub url: String,
}

impl TemplateContext {
    pub fn for_page(site: &Map<String, Value>, rel: &Path) -> Self {
        let path = rel.to_string_lossy().replace('\\', "/");
        let base = site
            .get("baseurl")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim_end_matches('/');
        Self {
            site: site.clone(),
            page: PageCtx {
                url: format!("{base}/{path}"),
                path,
            },
        }
    }

    pub fn to_tera(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_includes_baseurl() {
        let mut site = Map::new();
        site.insert("baseurl".into(), json!("/blog/"));
        let ctx = TemplateContext::for_page(&site, Path::new("posts/a.html"));
        assert_eq!(ctx.page.path, "posts/a.html");
        assert_eq!(ctx.page.url, "/blog/posts/a.html");
    }

    #[test]
    fn url_without_baseurl_is_root_relative() {
        let ctx = TemplateContext::for_page(&Map::new(), Path::new("index.html"));
        assert_eq!(ctx.page.url, "/index.html");
    }
}
