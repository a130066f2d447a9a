/// Marker placed on both sides of a placeholder name, e.g. `$$JOB_NAME$$`
pub const SIGIL: &str = "$$";

/// A piece of a template line, either verbatim text or a named parameter slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// name of the placeholder, without the surrounding sigils
    Placeholder(String),
}

impl Segment {
    /// the exact source text this segment was cut from
    pub fn source(&self) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Placeholder(name) => format!("{SIGIL}{name}{SIGIL}"),
        }
    }
}

/// check if a body is one or more groups of `[A-Z]` joined by single underscores
fn is_placeholder_name(body: &str) -> bool {
    !body.is_empty()
        && body
            .split('_')
            .all(|group| !group.is_empty() && group.bytes().all(|b| b.is_ascii_uppercase()))
}

/// try to read a placeholder starting at `start`, returning its name and the end offset
fn placeholder_at(line: &str, start: usize) -> Option<(&str, usize)> {
    let rest = line[start..].strip_prefix(SIGIL)?;
    let body_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_uppercase() || *b == b'_')
        .count();
    let body = &rest[..body_len];

    // the run can't contain the sigil, so a shorter body would never be followed by it either
    if is_placeholder_name(body) && rest[body_len..].starts_with(SIGIL) {
        Some((body, start + SIGIL.len() + body_len + SIGIL.len()))
    } else {
        None
    }
}

/// Split a single line into literal and placeholder segments.
///
/// Placeholders are matched leftmost first and never overlap. Literal runs between
/// them are kept verbatim, so joining the `source` of all segments gives back `line`.
pub fn tokenize(line: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = line[cursor..].find(SIGIL) {
        let start = cursor + offset;

        match placeholder_at(line, start) {
            Some((name, end)) => {
                if literal_start < start {
                    segments.push(Segment::Literal(line[literal_start..start].to_owned()));
                }
                segments.push(Segment::Placeholder(name.to_owned()));

                literal_start = end;
                cursor = end;
            }
            // `$` is a single byte, so stepping over one keeps us on a char boundary
            None => cursor = start + 1,
        }
    }

    if literal_start < line.len() {
        segments.push(Segment::Literal(line[literal_start..].to_owned()));
    }

    segments
}
