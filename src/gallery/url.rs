/// Maps a frame URL to the URL of a rendition with the given pixel width.
pub trait UrlResolver: Send + Sync + 'static {
    fn resolve(&self, url: &str, target_width: u32) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl UrlResolver for IdentityResolver {
    fn resolve(&self, url: &str, _target_width: u32) -> String {
        url.to_owned()
    }
}

/// Appends (or rewrites) a width query parameter, the way image CDNs take
/// resize hints: `https://cdn/x.jpg` becomes `https://cdn/x.jpg?wid=256`.
#[derive(Debug, Clone)]
pub struct WidthQueryResolver {
    param: String,
}

impl WidthQueryResolver {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl Default for WidthQueryResolver {
    fn default() -> Self {
        Self::new("wid")
    }
}

impl UrlResolver for WidthQueryResolver {
    fn resolve(&self, url: &str, target_width: u32) -> String {
        let (base, fragment) = match url.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (url, None),
        };
        let (path, query) = match base.split_once('?') {
            Some((path, query)) => (path, query),
            None => (base, ""),
        };

        let prefix = format!("{}=", self.param);
        let mut pairs: Vec<String> = query
            .split('&')
            .filter(|pair| !pair.is_empty() && !pair.starts_with(&prefix) && *pair != self.param)
            .map(str::to_owned)
            .collect();
        pairs.push(format!("{}{}", prefix, target_width));

        let mut resolved = format!("{}?{}", path, pairs.join("&"));
        if let Some(fragment) = fragment {
            resolved.push('#');
            resolved.push_str(fragment);
        }
        resolved
    }
}
