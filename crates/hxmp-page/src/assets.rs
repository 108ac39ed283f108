//! Version stamping of script and stylesheet URLs.

use std::borrow::Cow;

use hxmp_core::VersionRecord;

const VERSION_PARAM: &str = "v=";

/// Append `v=<version>-<timestamp>` to a page-relative asset URL so browsers
/// fetch it fresh after a deployment.
///
/// Absolute `http(s)` URLs and URLs already carrying a `v` parameter are
/// returned unchanged.
pub fn stamp_asset_url<'a>(src: &'a str, record: &VersionRecord) -> Cow<'a, str> {
    if src.is_empty() || src.starts_with("http") || is_stamped(src) {
        return Cow::Borrowed(src);
    }

    let (path, fragment) = match src.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (src, None),
    };
    let separator = if path.contains('?') { '&' } else { '?' };

    let mut stamped = format!("{path}{separator}{VERSION_PARAM}{}", record.asset_tag());
    if let Some(fragment) = fragment {
        stamped.push('#');
        stamped.push_str(fragment);
    }
    Cow::Owned(stamped)
}

fn is_stamped(src: &str) -> bool {
    let Some((_, query)) = src.split_once('?') else {
        return false;
    };
    query
        .split(['&', '#'])
        .any(|pair| pair.starts_with(VERSION_PARAM))
}
