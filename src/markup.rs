//! String-offset extraction primitives over raw markup.
//!
//! No parse tree: every operation is a literal substring scan returning byte
//! offsets, with `None` for "not found" so callers can branch on absence.

/// Search direction for [`find_element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A depth-balanced span of markup from an opening tag through its matching
/// close tag, with absolute byte offsets into the source document.
#[derive(Debug, Clone)]
pub struct Block<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Find the end of the balanced block whose opening marker is the first
/// occurrence of `open_marker` at or after `start`.
///
/// Depth starts at 1 on that opening; each nearer `open_marker` increments,
/// each `close_marker` decrements. Returns the offset just past the close
/// that brings depth back to zero, or `None` when no opening is found or the
/// nesting never resolves (missing close).
pub fn extract_block(
    haystack: &str,
    open_marker: &str,
    close_marker: &str,
    start: usize,
) -> Option<usize> {
    let first = start + haystack[start..].find(open_marker)?;
    let mut depth = 1usize;
    let mut cursor = first + open_marker.len();

    while depth > 0 {
        let open = haystack[cursor..].find(open_marker).map(|p| cursor + p);
        let close = cursor + haystack[cursor..].find(close_marker)?;
        match open {
            Some(o) if o < close => {
                depth += 1;
                cursor = o + open_marker.len();
            }
            _ => {
                depth -= 1;
                cursor = close + close_marker.len();
            }
        }
    }
    Some(cursor)
}

/// Locate `anchor` from `from` (forward or backward) and return the element
/// it starts: the tag itself, extended through `terminator` when the tag's
/// own `>` is not already it. The returned offset is just past the element
/// so repeated calls can chain forward.
pub fn find_element<'a>(
    haystack: &'a str,
    anchor: &str,
    terminator: &str,
    from: usize,
    direction: Direction,
) -> Option<(usize, &'a str)> {
    let pos = match direction {
        Direction::Forward => from + haystack[from..].find(anchor)?,
        Direction::Backward => haystack[..from].rfind(anchor)?,
    };

    // span of the opening tag itself
    let mut end = extract_block(haystack, "<", ">", pos)?;

    // extend through the terminator unless the tag close already is it
    let last = end - 1;
    if !haystack[last..].starts_with(terminator) {
        end = last + haystack[last..].find(terminator)?;
    }

    Some((end, &haystack[pos..end]))
}

/// Value of `name="..."` (or single-quoted) inside an element's text, or
/// `None` when the attribute is absent.
pub fn attribute_value<'a>(element: &'a str, name: &str) -> Option<&'a str> {
    let pos = element.find(&format!("{name}="))?;
    let (quote_pos, quote) = find_first(element, &["\"", "'"], pos)?;
    let start = quote_pos + 1;
    let end = start + element[start..].find(quote)?;
    Some(&element[start..end])
}

/// Everything after the first tag's closing `>`.
pub fn tag_body(element: &str) -> Option<&str> {
    let end = extract_block(element, "<", ">", 0)?;
    Some(&element[end..])
}

/// Apply [`tag_body`] `depth` times, then truncate at the next `<`.
///
/// Fixed-depth reach into known markup; a site layout shift silently moves
/// the target, so callers must treat an empty result as degradation.
pub fn nested_body(element: &str, depth: usize) -> Option<&str> {
    let mut cursor = element;
    for _ in 0..depth {
        cursor = tag_body(cursor)?;
    }
    Some(match cursor.find('<') {
        Some(end) => &cursor[..end],
        None => cursor,
    })
}

/// Literal text between the next `open` at/after `from` and the following
/// `close`, plus the offset of that `close` for chained calls.
pub fn enclosed_text<'a>(
    haystack: &'a str,
    open: &str,
    close: &str,
    from: usize,
) -> Option<(usize, &'a str)> {
    let start = from + haystack[from..].find(open)? + open.len();
    let end = start + haystack[start..].find(close)?;
    Some((end, &haystack[start..end]))
}

/// Carve `document` into the ordered sequence of top-level `tag_name` blocks
/// bearing `class_marker`.
///
/// Each round finds the next marker, snaps back to the nearest preceding
/// `<tag_name ` open (the marker usually sits on an attribute inside the
/// tag), runs the balanced scan, and continues after the block's end, so
/// markers inside an emitted block are never yielded separately. A marker
/// whose block never resolves ends the collection.
pub fn collect_blocks<'a>(
    document: &'a str,
    class_marker: &str,
    tag_name: &str,
) -> Vec<Block<'a>> {
    let open_tag = format!("<{tag_name} ");
    let open_marker = format!("<{tag_name}");
    let close_marker = format!("</{tag_name}>");

    let mut blocks = Vec::new();
    let mut rest = document;
    let mut base = 0usize;

    while let Some(first) = rest.find(class_marker) {
        let Some(start) = rest[..first].rfind(&open_tag) else {
            break;
        };
        let Some(end) = extract_block(rest, &open_marker, &close_marker, start) else {
            break;
        };
        blocks.push(Block {
            start: base + start,
            end: base + end,
            text: &rest[start..end],
        });
        base += end;
        rest = &rest[end..];
    }

    blocks
}

/// Nearest occurrence of any needle at/after `from`, with the needle that
/// matched.
fn find_first<'n>(haystack: &str, needles: &[&'n str], from: usize) -> Option<(usize, &'n str)> {
    needles
        .iter()
        .filter_map(|n| haystack[from..].find(n).map(|p| (from + p, *n)))
        .min_by_key(|(p, _)| *p)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn block_spans_nested_tags() {
        let html = "<div><div>inner</div></div><div>after</div>";
        let end = extract_block(html, "<div", "</div>", 0).unwrap();
        assert_eq!(&html[..end], "<div><div>inner</div></div>");
    }

    #[test]
    fn block_is_balanced_and_minimal() {
        let html = "<div a><div b><div c></div></div></div> trailing";
        let end = extract_block(html, "<div", "</div>", 0).unwrap();
        let block = &html[..end];
        assert_eq!(count(block, "<div"), count(block, "</div>"));
        // No proper prefix ending on a close tag is balanced
        for (i, _) in block.match_indices("</div>").take(2) {
            let prefix = &block[..i + "</div>".len()];
            assert_ne!(count(prefix, "<div"), count(prefix, "</div>"));
        }
    }

    #[test]
    fn unclosed_block_is_a_lookup_failure() {
        assert_eq!(extract_block("<div><div></div>", "<div", "</div>", 0), None);
        assert_eq!(extract_block("no tags here", "<div", "</div>", 0), None);
    }

    #[test]
    fn collects_top_level_blocks_in_order() {
        let doc = concat!(
            "<header>x</header>",
            "<div class=\"item\" id=\"a\"><div>one</div></div>",
            " between ",
            "<div class=\"item\" id=\"b\">two</div>",
            " tail"
        );
        let blocks = collect_blocks(doc, "class=\"item\"", "div");
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].text.contains("one"));
        assert!(blocks[1].text.contains("two"));
        assert!(blocks[0].end <= blocks[1].start);
        // Offsets slice the source document
        for b in &blocks {
            assert_eq!(&doc[b.start..b.end], b.text);
        }
    }

    #[test]
    fn nested_marker_not_yielded_twice() {
        let doc = "<div class=\"item\"><div class=\"item\">inner</div></div>";
        let blocks = collect_blocks(doc, "class=\"item\"", "div");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, doc);
    }

    #[test]
    fn attribute_present_and_absent() {
        assert_eq!(attribute_value("<a href=\"/x/y\">", "href"), Some("/x/y"));
        assert_eq!(attribute_value("<a class=\"z\">", "href"), None);
        assert_eq!(attribute_value("<a href='/q'>", "href"), Some("/q"));
    }

    #[test]
    fn body_strips_opening_tag() {
        assert_eq!(tag_body("<p class=\"x\">hello"), Some("hello"));
        assert_eq!(tag_body("plain"), None);
    }

    #[test]
    fn nested_body_reaches_fixed_depth() {
        let elem = "<span class=\"tag\"><a href=\"/t\">Deep House</a></span>";
        assert_eq!(nested_body(elem, 2), Some("Deep House"));
        assert_eq!(nested_body(elem, 1), Some(""));
    }

    #[test]
    fn element_extends_to_terminator() {
        let html = "<a class=\"text-md\" href=\"/a\">Artist Name</a><a class=\"text-md\" href=\"/t\">Title</a>";
        let (off, artist) = find_element(html, "<a class=\"text-md\"", "</a>", 0, Direction::Forward).unwrap();
        assert_eq!(tag_body(artist), Some("Artist Name"));
        let (_, title) = find_element(html, "<a class=\"text-md\"", "</a>", off, Direction::Forward).unwrap();
        assert_eq!(tag_body(title), Some("Title"));
    }

    #[test]
    fn element_with_tag_close_terminator() {
        let html = "text <div id=\"item-1\" class=\"dv-item\">body";
        let (end, elem) = find_element(html, "<div id=", ">", 0, Direction::Forward).unwrap();
        assert_eq!(elem, "<div id=\"item-1\" class=\"dv-item\">");
        assert_eq!(&html[end..], "body");
    }

    #[test]
    fn element_backward_search() {
        let html = "<div a=\"1\">x<div a=\"2\">y";
        let anchor_from = html.rfind('y').unwrap();
        let (_, elem) = find_element(html, "<div", ">", anchor_from, Direction::Backward).unwrap();
        assert!(elem.starts_with("<div a=\"2\""));
    }

    #[test]
    fn element_absent_anchor() {
        assert!(find_element("<p>x</p>", "<div id=", ">", 0, Direction::Forward).is_none());
    }

    #[test]
    fn enclosed_text_chains() {
        let elem = "<p class=\"label\">CAT001<br><a href=\"/l\">Label Name</a>";
        let (end, cat) = enclosed_text(elem, ">", "<", 0).unwrap();
        assert_eq!(cat, "CAT001");
        let (end, gap) = enclosed_text(elem, ">", "<", end).unwrap();
        assert_eq!(gap, "");
        let (_, label) = enclosed_text(elem, ">", "<", end).unwrap();
        assert_eq!(label, "Label Name");
    }
}
