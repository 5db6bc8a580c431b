//! URI routing helpers
//!
//! A request URI is reduced to a scheme, a bucket and a user-info string;
//! those are what [`FileSystemRegistry::resolve`](super::FileSystemRegistry::resolve)
//! matches mounts on.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

/// Scheme aliases folded onto their canonical name
const SCHEME_ALIASES: &[(&str, &str)] = &[("s3a", "s3")];

pub fn normalize_scheme(scheme: &str) -> String {
    let scheme = scheme.to_ascii_lowercase();
    SCHEME_ALIASES
        .iter()
        .find(|(alias, _)| *alias == scheme)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(scheme)
}

/// What a request URI says about its target mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub scheme: String,
    pub bucket: Option<String>,
    pub user_info: Option<String>,
}

impl RequestTarget {
    pub fn from_url(url: &Url, raw: &str) -> Self {
        let scheme = normalize_scheme(url.scheme());
        let user_info = user_info(url);
        let host = url.host_str().filter(|h| !h.is_empty());

        let (bucket, user_info) = match (user_info, host) {
            (Some(user_info), _) => (first_segment(url), Some(user_info)),
            (None, None) => {
                let user_info = raw_authority(raw)
                    .and_then(|authority| authority.split_once('@'))
                    .map(|(user_info, _)| decode(user_info).into_owned())
                    .filter(|u| !u.is_empty());
                (first_segment(url), user_info)
            }
            (None, Some(host)) => (Some(decode(host).into_owned()), None),
        };

        Self {
            scheme,
            bucket,
            user_info,
        }
    }
}

/// `user[:password]` as written in the URI
pub fn user_info(url: &Url) -> Option<String> {
    if url.username().is_empty() {
        return None;
    }
    let username = decode(url.username());
    Some(match url.password() {
        Some(password) => format!("{}:{}", username, decode(password)),
        None => username.into_owned(),
    })
}

fn decode(text: &str) -> Cow<'_, str> {
    percent_decode_str(text).decode_utf8_lossy()
}

fn first_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .map(|s| decode(s).into_owned())
}

/// Request path with every segment percent-decoded; query and fragment dropped
pub fn decoded_path(url: &Url) -> String {
    match url.path_segments() {
        Some(segments) => segments.fold(String::new(), |mut path, segment| {
            path.push('/');
            path.push_str(&decode(segment));
            path
        }),
        None => decode(url.path()).into_owned(),
    }
}

/// Authority text between `//` and the path, straight from the input
fn raw_authority(raw: &str) -> Option<&str> {
    let (_, rest) = raw.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Case-insensitive match that never treats two missing values as equal
pub fn same(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Drop every segment equal to `bucket`; the result is always absolute and
/// keeps a trailing separator if the input had one
pub fn strip_bucket(path: &str, bucket: Option<&str>) -> String {
    let trailing = path.ends_with('/');

    let kept: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !bucket.is_some_and(|b| segment.eq_ignore_ascii_case(b)))
        .collect();

    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    out.push_str(&kept.join("/"));
    if trailing && !kept.is_empty() {
        out.push('/');
    }
    out
}
