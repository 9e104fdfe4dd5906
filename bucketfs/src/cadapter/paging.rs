//! Delimiter grouping and continuation tokens for backends that keep their
//! keys in a sorted in-process collection (memory, local directory).

use super::client::{ListPage, ListRequest, ObjectSummary};

const OBJECT_TOKEN: &str = "o:";
const PREFIX_TOKEN: &str = "p:";

/// Builds one page out of `entries`, which must be sorted by key.
///
/// Tokens remember whether the last emitted entry was an object or a common
/// prefix so a resumed listing never repeats a prefix.
pub(crate) fn page_of<I>(entries: I, request: &ListRequest, page_size: usize) -> ListPage
where
    I: IntoIterator<Item = ObjectSummary>,
{
    let prefix = request.prefix.as_deref().unwrap_or("");
    let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
    let limit = request
        .max_keys
        .map(|m| m as usize)
        .unwrap_or(page_size)
        .clamp(1, page_size.max(1));

    let (after_key, after_prefix) = match request.continuation_token.as_deref() {
        Some(token) => match token.strip_prefix(PREFIX_TOKEN) {
            Some(cp) => (Some(cp.to_string()), Some(cp.to_string())),
            None => (
                Some(token.strip_prefix(OBJECT_TOKEN).unwrap_or(token).to_string()),
                None,
            ),
        },
        None => (request.start_after.clone(), None),
    };

    let mut page = ListPage::default();
    let mut count = 0usize;
    let mut last_token = None;

    for summary in entries {
        let key = summary.key.as_str();
        if !key.starts_with(prefix) {
            continue;
        }
        if let Some(after) = after_key.as_deref() {
            if key <= after {
                continue;
            }
        }
        if let Some(cp) = after_prefix.as_deref() {
            if key.starts_with(cp) {
                continue;
            }
        }

        let rest = &key[prefix.len()..];
        let grouped = delimiter.and_then(|d| rest.find(d).map(|pos| (pos, d)));
        match grouped {
            Some((pos, d)) => {
                let cp = format!("{prefix}{}{d}", &rest[..pos]);
                if page.common_prefixes.last() == Some(&cp) {
                    continue;
                }
                if count == limit {
                    page.is_truncated = true;
                    break;
                }
                last_token = Some(format!("{PREFIX_TOKEN}{cp}"));
                page.common_prefixes.push(cp);
            }
            None => {
                if count == limit {
                    page.is_truncated = true;
                    break;
                }
                last_token = Some(format!("{OBJECT_TOKEN}{key}"));
                page.objects.push(summary);
            }
        }
        count += 1;
    }

    if page.is_truncated {
        page.next_continuation_token = last_token;
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summaries(keys: &[&str]) -> Vec<ObjectSummary> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.into_iter()
            .map(|k| ObjectSummary {
                key: k.to_string(),
                etag: String::new(),
                size: 0,
                last_modified: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_groups_by_delimiter() {
        let keys = summaries(&["docs/a.txt", "docs/b/c.txt", "docs/b/d.txt", "img/x.png", "top"]);
        let req = ListRequest::new().with_prefix("docs/").with_delimiter("/");
        let page = page_of(keys.clone(), &req, 1000);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "docs/a.txt");
        assert_eq!(page.common_prefixes, vec!["docs/b/".to_string()]);
        assert!(!page.is_truncated);

        let root = page_of(keys, &ListRequest::new().with_delimiter("/"), 1000);
        assert_eq!(root.common_prefixes, vec!["docs/", "img/"]);
        assert_eq!(root.objects[0].key, "top");
    }

    #[test]
    fn test_pagination_never_repeats_prefix() {
        let keys = summaries(&["a/1", "a/2", "a/3", "b", "c/1", "d"]);
        let mut req = ListRequest::new().with_delimiter("/");
        let mut seen = Vec::new();
        loop {
            let page = page_of(keys.clone(), &req, 1);
            seen.extend(page.objects.iter().map(|o| o.key.clone()));
            seen.extend(page.common_prefixes.iter().cloned());
            if !page.is_truncated {
                break;
            }
            req.continuation_token = page.next_continuation_token;
        }
        assert_eq!(seen, vec!["a/", "b", "c/", "d"]);
    }

    #[test]
    fn test_start_after_and_max_keys() {
        let keys = summaries(&["k1", "k2", "k3", "k4"]);
        let req = ListRequest::new().with_start_after("k2").with_max_keys(1);
        let page = page_of(keys, &req, 1000);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "k3");
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("o:k3"));
    }
}
