use url::Url;

/// Ensures an index URL ends with a slash. Joining a package name onto a URL
/// without one replaces the last path segment instead of appending, which silently
/// queries the wrong page.
pub fn normalize_index_url(mut url: Url) -> Url {
    let path = url.path();
    if !path.ends_with('/') {
        url.set_path(&format!("{path}/"));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_added_once() {
        let url = Url::parse("https://pypi.org/simple").unwrap();
        let normalized = normalize_index_url(url);
        assert_eq!(normalized.as_str(), "https://pypi.org/simple/");
        assert_eq!(
            normalize_index_url(normalized.clone()).as_str(),
            normalized.as_str()
        );
    }
}
