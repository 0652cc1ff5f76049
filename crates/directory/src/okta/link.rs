//! `Link` response header parsing
//!
//! The identity API advertises the next page as
//! `<https://host/api/v1/users?after=00u9&limit=100>; rel="next"`.
//! Several links may share one header value (comma separated) or be sent
//! as repeated header lines.

/// One `<url>; param=value` entry of a `Link` header
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkEntry<'a> {
    target: &'a str,
    rels: Vec<&'a str>,
}

/// Extract the `after` cursor of the `rel="next"` link, if any
pub fn next_cursor<'a>(link_values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    link_values
        .into_iter()
        .flat_map(parse_entries)
        .find(|entry| entry.rels.contains(&"next"))
        .and_then(|entry| after_param(entry.target))
}

/// Split a header value into entries.
///
/// Entries are delimited by the `<` that opens each target rather than by
/// commas, since targets may legitimately contain commas.
fn parse_entries(value: &str) -> Vec<LinkEntry<'_>> {
    let mut entries = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let target = &after_open[..close];
        let tail = &after_open[close + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        let params = &tail[..params_end];

        entries.push(LinkEntry {
            target,
            rels: rel_values(params),
        });
        rest = &tail[params_end..];
    }

    entries
}

/// Values of the `rel` parameter, which may list several space separated relations
fn rel_values(params: &str) -> Vec<&str> {
    params
        .split(';')
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("rel") {
                return None;
            }
            Some(value.trim().trim_end_matches(',').trim().trim_matches('"'))
        })
        .flat_map(str::split_whitespace)
        .collect()
}

/// Read the `after` query parameter from a link target
fn after_param(target: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "after")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
