// ABOUTME: Favicon discovery for channels that declare no image of their own.
// ABOUTME: Reads <link rel=icon> candidates from the homepage, then probes conventional paths.

use rssdump_feed::{base_domain, find_icon_links, resolve_url};
use tracing::debug;

use crate::fetcher::Fetcher;

/// Paths probed with HEAD when the homepage advertises no icon.
pub const CONVENTIONAL_ICON_PATHS: &[&str] = &["/favicon.ico", "/favicon.png", "/apple-touch-icon.png"];

/// Absolute URL of the site's icon, or `None` when nothing could be found.
pub async fn discover_favicon(fetcher: &dyn Fetcher, site_url: &str) -> Option<String> {
    match fetcher.get(site_url, &[]).await {
        Ok(page) => {
            let html = page.text_utf8();
            let base = page.final_url.as_str();
            if let Some(icon) = find_icon_links(&html)
                .iter()
                .find_map(|href| resolve_url(href, Some(base)))
            {
                debug!(site = site_url, icon = %icon, "icon advertised by homepage");
                return Some(icon);
            }
        }
        Err(e) => debug!(site = site_url, error = %e, "homepage unavailable"),
    }

    let origin = base_domain(site_url)?;
    for path in CONVENTIONAL_ICON_PATHS {
        let candidate = format!("{}{}", origin, path);
        match fetcher.head(&candidate).await {
            Ok(200) => return Some(candidate),
            Ok(status) => debug!(url = %candidate, status, "icon probe missed"),
            Err(e) => debug!(url = %candidate, error = %e, "icon probe failed"),
        }
    }
    None
}
