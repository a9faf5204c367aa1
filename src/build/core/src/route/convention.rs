/* src/build/core/src/route/convention.rs */

// Flat file-route naming: `users.$id.edit.tsx`, `_auth.login.tsx`, `sitemap[.]xml.ts`.

/// Split a route name on `.` outside `[...]` escapes.
pub(crate) fn split_segments(name: &str) -> Vec<String> {
  let mut segments = Vec::new();
  let mut current = String::new();
  let mut escaped = false;
  for ch in name.chars() {
    match ch {
      '[' => {
        escaped = true;
        current.push(ch);
      }
      ']' => {
        escaped = false;
        current.push(ch);
      }
      '.' if !escaped => segments.push(std::mem::take(&mut current)),
      _ => current.push(ch),
    }
  }
  segments.push(current);
  segments
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
  Index,
  Pathless,
  Path(String),
}

pub(crate) fn parse_segment(raw: &str) -> Segment {
  if raw == "_index" {
    return Segment::Index;
  }
  if raw.starts_with('_') {
    return Segment::Pathless;
  }
  // trailing `_` opts out of nesting but keeps the path text
  let raw = raw.strip_suffix('_').unwrap_or(raw);
  if raw == "$" {
    return Segment::Path("*".to_string());
  }
  if let Some(inner) = raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
    let inner = match inner.strip_prefix('$') {
      Some(param) => format!(":{param}"),
      None => unescape(inner),
    };
    return Segment::Path(format!("{inner}?"));
  }
  if let Some(param) = raw.strip_prefix('$') {
    return Segment::Path(format!(":{param}"));
  }
  Segment::Path(unescape(raw))
}

fn unescape(raw: &str) -> String {
  raw.chars().filter(|c| *c != '[' && *c != ']').collect()
}

/// Path pattern for `segments`, or `None` when every segment is index/pathless.
pub(crate) fn segments_to_path(segments: &[String]) -> Option<String> {
  let parts: Vec<String> = segments
    .iter()
    .filter_map(|s| match parse_segment(s) {
      Segment::Path(p) => Some(p),
      Segment::Index | Segment::Pathless => None,
    })
    .collect();
  if parts.is_empty() { None } else { Some(parts.join("/")) }
}

/// Length of the longest proper prefix of `segments` whose dotted name satisfies `is_route`.
pub(crate) fn parent_prefix_len(segments: &[String], is_route: impl Fn(&str) -> bool) -> Option<usize> {
  (1..segments.len()).rev().find(|&k| is_route(&segments[..k].join(".")))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn segs(name: &str) -> Vec<String> {
    split_segments(name)
  }

  #[test]
  fn splits_on_dots() {
    assert_eq!(segs("users.$id.edit"), vec!["users", "$id", "edit"]);
  }

  #[test]
  fn escaped_dot_is_kept() {
    assert_eq!(segs("sitemap[.]xml"), vec!["sitemap[.]xml"]);
    assert_eq!(segments_to_path(&segs("sitemap[.]xml")).as_deref(), Some("sitemap.xml"));
  }

  #[test]
  fn segment_kinds() {
    assert_eq!(parse_segment("_index"), Segment::Index);
    assert_eq!(parse_segment("_auth"), Segment::Pathless);
    assert_eq!(parse_segment("$"), Segment::Path("*".into()));
    assert_eq!(parse_segment("$id"), Segment::Path(":id".into()));
    assert_eq!(parse_segment("($lang)"), Segment::Path(":lang?".into()));
    assert_eq!(parse_segment("(en)"), Segment::Path("en?".into()));
    assert_eq!(parse_segment("app_"), Segment::Path("app".into()));
    assert_eq!(parse_segment("signup"), Segment::Path("signup".into()));
  }

  #[test]
  fn index_and_pathless_have_no_path() {
    assert_eq!(segments_to_path(&segs("_index")), None);
    assert_eq!(segments_to_path(&segs("_auth")), None);
    assert_eq!(segments_to_path(&segs("_auth.login")).as_deref(), Some("login"));
  }

  #[test]
  fn longest_prefix_wins() {
    let known = ["users", "users.$id"];
    let s = segs("users.$id.edit");
    assert_eq!(parent_prefix_len(&s, |n| known.contains(&n)), Some(2));
    let s = segs("posts.new");
    assert_eq!(parent_prefix_len(&s, |n| known.contains(&n)), None);
  }

  #[test]
  fn trailing_underscore_breaks_nesting() {
    let known = ["app"];
    let s = segs("app_.projects");
    assert_eq!(parent_prefix_len(&s, |n| known.contains(&n)), None);
    assert_eq!(segments_to_path(&s).as_deref(), Some("app/projects"));
  }
}
