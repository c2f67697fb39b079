//! Furigana annotation: reading entries, the per-document dictionary and the
//! `<ruby>` markup built from them.

use indexmap::IndexMap;
use sx::node::{AttributeGroup, Element, Node};

const DICTIONARY_COMMENT: char = '#';

/// Elements whose text `$ruby` never annotates.
const SKIPPED_ELEMENTS: &[&str] = &["ruby", "rt", "rp", "script", "style"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RubyError {
    #[error("malformed ruby entry '{entry}': {reason}")]
    Malformed { entry: String, reason: &'static str },
    #[error("ruby entry '{surface}' has {readings} readings for {characters} characters")]
    SegmentMismatch {
        surface: String,
        characters: usize,
        readings: usize,
    },
}

/// A surface string with its reading(s).
///
/// A single reading covers the whole surface; otherwise there is exactly one
/// reading per character.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingEntry {
    pub surface: String,
    pub readings: Vec<String>,
}

/// One item of ruby text: `surface:r1,r2` or a bare `surface`.
#[derive(Debug, Clone, PartialEq)]
pub enum RubyText {
    Annotated(ReadingEntry),
    Bare(String),
}

impl ReadingEntry {
    pub fn new(surface: impl Into<String>, readings: Vec<String>) -> Result<Self, RubyError> {
        let surface = surface.into();
        if surface.is_empty() {
            return Err(RubyError::Malformed {
                entry: surface,
                reason: "empty surface",
            });
        }
        if readings.is_empty() || readings.iter().any(String::is_empty) {
            return Err(RubyError::Malformed {
                entry: surface,
                reason: "empty reading",
            });
        }
        let characters = surface.chars().count();
        if readings.len() > 1 && readings.len() != characters {
            return Err(RubyError::SegmentMismatch {
                surface,
                characters,
                readings: readings.len(),
            });
        }
        Ok(ReadingEntry { surface, readings })
    }

    /// Parse `surface[:reading,reading,...]`. Surface and readings are trimmed.
    pub fn parse(text: &str) -> Result<RubyText, RubyError> {
        let (surface, readings) = match text.split_once(':') {
            Some((surface, readings)) => (surface.trim(), Some(readings)),
            None => (text.trim(), None),
        };
        if surface.is_empty() {
            return Err(RubyError::Malformed {
                entry: text.to_string(),
                reason: "empty surface",
            });
        }
        match readings {
            None => Ok(RubyText::Bare(surface.to_string())),
            Some(readings) => {
                let readings = readings.split(',').map(|r| r.trim().to_string()).collect();
                ReadingEntry::new(surface, readings).map(RubyText::Annotated)
            }
        }
    }

    /// Base text paired with its reading, in order.
    pub fn segments(&self) -> Vec<(String, &str)> {
        if self.readings.len() == 1 {
            return vec![(self.surface.clone(), self.readings[0].as_str())];
        }
        self.surface
            .chars()
            .zip(&self.readings)
            .map(|(ch, reading)| (ch.to_string(), reading.as_str()))
            .collect()
    }

    /// `base<rp>(</rp><rt>reading</rt><rp>)</rp>` for every segment.
    pub fn markup(&self) -> Vec<Node> {
        let mut nodes = Vec::new();
        for (base, reading) in self.segments() {
            nodes.push(Node::Text(base));
            nodes.push(Node::Element(Element::new("rp").with_child(Node::text("("))));
            nodes.push(Node::Element(Element::new("rt").with_child(Node::text(reading))));
            nodes.push(Node::Element(Element::new("rp").with_child(Node::text(")"))));
        }
        nodes
    }
}

/// A `<ruby>` element carrying `groups` around `children`.
pub fn ruby_element(groups: &[AttributeGroup], children: Vec<Node>) -> Element {
    Element::new("ruby")
        .with_groups(groups.to_vec())
        .with_children(children)
}

// ---- Dictionary ----

/// Surface to readings, in registration order. Re-registering a surface
/// replaces its readings, so the latest registration always wins.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<String, Vec<String>>,
    /// Longest surface seen, in characters.
    longest: usize,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(&mut self, entry: ReadingEntry) {
        tracing::debug!(surface = %entry.surface, readings = ?entry.readings, "ruby entry registered");
        self.longest = self.longest.max(entry.surface.chars().count());
        self.entries.shift_remove(&entry.surface);
        self.entries.insert(entry.surface, entry.readings);
    }

    pub fn lookup(&self, surface: &str) -> Option<ReadingEntry> {
        self.entries
            .get_key_value(surface)
            .map(|(surface, readings)| ReadingEntry {
                surface: surface.clone(),
                readings: readings.clone(),
            })
    }

    /// Resolve one `@ruby` item. An annotated item is registered; a bare item
    /// is looked up and re-registered. `None` when a bare item is unknown.
    ///
    /// A per-character entry also registers each character with its own
    /// reading, so `漢字:かん,じ` makes `漢` and `字` resolvable on their own.
    pub fn resolve(&mut self, text: &str) -> Result<Option<ReadingEntry>, RubyError> {
        let entry = match ReadingEntry::parse(text)? {
            RubyText::Annotated(entry) => entry,
            RubyText::Bare(surface) => match self.lookup(&surface) {
                Some(entry) => entry,
                None => return Ok(None),
            },
        };
        if entry.readings.len() > 1 {
            for (ch, reading) in entry.surface.chars().zip(&entry.readings) {
                self.register(ReadingEntry {
                    surface: ch.to_string(),
                    readings: vec![reading.clone()],
                });
            }
        }
        self.register(entry.clone());
        Ok(Some(entry))
    }

    /// Load dictionary text: one item per line, blank lines and `#` comments
    /// skipped. Returns how many lines registered an entry.
    pub fn load(&mut self, text: &str) -> Result<usize, RubyError> {
        let mut registered = 0;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(DICTIONARY_COMMENT) {
                continue;
            }
            if self.resolve(line)?.is_some() {
                registered += 1;
            } else {
                tracing::debug!(surface = line, "unknown bare dictionary line skipped");
            }
        }
        Ok(registered)
    }

    /// Longest registered surface that prefixes `text`, with its byte length.
    pub fn longest_match(&self, text: &str) -> Option<(usize, ReadingEntry)> {
        let ends: Vec<usize> = text
            .char_indices()
            .map(|(i, ch)| i + ch.len_utf8())
            .take(self.longest)
            .collect();
        ends.into_iter()
            .rev()
            .find_map(|end| self.lookup(&text[..end]).map(|entry| (end, entry)))
    }

    /// Split `text` into plain text and `<ruby>` runs, scanning left to right
    /// with the longest match at each position.
    pub fn annotate(&self, text: &str, groups: &[AttributeGroup]) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut plain = String::new();
        let mut rest = text;
        while let Some(ch) = rest.chars().next() {
            match self.longest_match(rest) {
                Some((len, entry)) => {
                    if !plain.is_empty() {
                        nodes.push(Node::Text(std::mem::take(&mut plain)));
                    }
                    nodes.push(Node::Element(ruby_element(groups, entry.markup())));
                    rest = &rest[len..];
                }
                None => {
                    plain.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        if !plain.is_empty() {
            nodes.push(Node::Text(plain));
        }
        nodes
    }
}

/// Whether `$ruby` leaves the text inside a `head` element alone.
pub fn annotation_skipped(head: &str) -> bool {
    SKIPPED_ELEMENTS
        .iter()
        .any(|skipped| head.eq_ignore_ascii_case(skipped))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(text: &str) -> ReadingEntry {
        match ReadingEntry::parse(text).unwrap() {
            RubyText::Annotated(entry) => entry,
            RubyText::Bare(s) => panic!("expected readings for {s}"),
        }
    }

    #[test]
    fn parse_forms() {
        let e = entry(" 漢字 : かん , じ ");
        assert_eq!(e.surface, "漢字");
        assert_eq!(e.readings, vec!["かん", "じ"]);
        assert_eq!(ReadingEntry::parse("漢字").unwrap(), RubyText::Bare("漢字".into()));
    }

    #[test]
    fn parse_rejects_bad_entries() {
        assert!(matches!(
            ReadingEntry::parse(":かん"),
            Err(RubyError::Malformed { .. })
        ));
        assert!(matches!(
            ReadingEntry::parse("漢字:かん,"),
            Err(RubyError::Malformed { .. })
        ));
        assert_eq!(
            ReadingEntry::parse("漢字:か,ん,じ"),
            Err(RubyError::SegmentMismatch {
                surface: "漢字".into(),
                characters: 2,
                readings: 3,
            })
        );
    }

    #[test]
    fn segments_follow_reading_count() {
        assert_eq!(entry("漢字:かんじ").segments(), vec![("漢字".to_string(), "かんじ")]);
        assert_eq!(
            entry("漢字:かん,じ").segments(),
            vec![("漢".to_string(), "かん"), ("字".to_string(), "じ")]
        );
    }

    #[test]
    fn later_registration_wins() {
        let mut dict = Dictionary::new();
        dict.register(entry("日:ひ"));
        dict.register(entry("日:にち"));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.lookup("日").unwrap().readings, vec!["にち"]);
    }

    #[test]
    fn resolve_registers_and_looks_up() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.resolve("漢字").unwrap(), None);
        dict.resolve("漢字:かん,じ").unwrap();
        assert_eq!(dict.resolve("漢字").unwrap().unwrap().readings, vec!["かん", "じ"]);
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let mut dict = Dictionary::new();
        let text = "# readings\n\n漢字:かん,じ\n  日本:にほん  \n未知\n";
        assert_eq!(dict.load(text).unwrap(), 2);
        assert!(dict.lookup("日本").is_some());
        assert!(dict.lookup("未知").is_none());
    }

    #[test]
    fn longest_match_prefers_longer_surface() {
        let mut dict = Dictionary::new();
        dict.register(entry("日:ひ"));
        dict.register(entry("日本:にほん"));
        let (len, found) = dict.longest_match("日本語").unwrap();
        assert_eq!(len, "日本".len());
        assert_eq!(found.surface, "日本");
        assert!(dict.longest_match("語").is_none());
    }

    #[test]
    fn annotate_mixes_text_and_ruby() {
        let mut dict = Dictionary::new();
        dict.register(entry("日本:にほん"));
        let nodes = dict.annotate("私は日本人", &[]);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::text("私は"));
        let ruby = nodes[1].as_element().unwrap();
        assert!(ruby.is("ruby"));
        assert_eq!(ruby.children, entry("日本:にほん").markup());
        assert_eq!(nodes[2], Node::text("人"));
    }

    #[test]
    fn ruby_and_raw_text_elements_are_not_annotated() {
        assert!(annotation_skipped("ruby"));
        assert!(annotation_skipped("RT"));
        assert!(annotation_skipped("script"));
        assert!(!annotation_skipped("p"));
    }

    #[test]
    fn per_character_entry_registers_each_character() {
        let mut dict = Dictionary::new();
        dict.resolve("漢字:かん,じ").unwrap();
        assert_eq!(dict.lookup("漢").unwrap().readings, vec!["かん"]);
        assert_eq!(dict.lookup("字").unwrap().readings, vec!["じ"]);
        assert_eq!(dict.lookup("漢字").unwrap().readings, vec!["かん", "じ"]);
        assert_eq!(dict.resolve("字").unwrap().unwrap().readings, vec!["じ"]);

        dict.resolve("日本:にほん").unwrap();
        assert!(dict.lookup("日").is_none());
    }
}
