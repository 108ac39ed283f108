//! HTML rewriting: legacy no-cache meta tags out, cache-buster script in.

/// Meta tags that disabled caching before the cache buster existed.
pub const LEGACY_CACHE_TAGS: &[&str] = &[
    r#"<meta http-equiv="Cache-Control" content="no-cache, no-store, must-revalidate">"#,
    r#"<meta http-equiv="Pragma" content="no-cache">"#,
    r#"<meta http-equiv="Expires" content="0">"#,
];

pub const CACHE_BUSTER_SCRIPT: &str = r#"<script src="cache-buster.js"></script>"#;

/// Rewrite one page. Returns `None` when nothing changed.
pub fn update_html(content: &str) -> Option<String> {
    let mut html = content.to_string();
    let mut modified = false;

    for tag in LEGACY_CACHE_TAGS {
        if let Some(stripped) = remove_tag(&html, tag) {
            html = stripped;
            modified = true;
        }
    }

    if !html.contains("cache-buster.js") && html.contains("</head>") {
        html = html.replacen("</head>", &format!("    {CACHE_BUSTER_SCRIPT}\n</head>"), 1);
        modified = true;
    }

    modified.then_some(html)
}

/// Remove every occurrence of `tag` together with the whitespace after it.
fn remove_tag(html: &str, tag: &str) -> Option<String> {
    if !html.contains(tag) {
        return None;
    }

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(index) = rest.find(tag) {
        out.push_str(&rest[..index]);
        rest = rest[index + tag.len()..].trim_start();
    }
    out.push_str(rest);
    Some(out)
}
