use serde::Serialize;
use similar::{DiffTag, TextDiff};

/// Below this character similarity a replaced word run is shown whole
/// instead of being broken into character fragments.
const CHAR_REFINE_RATIO: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// A run of text on one side of an entity diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<TokenClass>,
    pub value: String,
}

impl Token {
    /// A token without class, used for whole added or removed values.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            class: None,
            value: value.into(),
        }
    }

    pub fn new(class: TokenClass, value: impl Into<String>) -> Self {
        Self {
            class: Some(class),
            value: value.into(),
        }
    }
}

#[derive(Default)]
struct Sides {
    old: Vec<Token>,
    new: Vec<Token>,
}

impl Sides {
    fn push_old(&mut self, class: TokenClass, value: &str) {
        push(&mut self.old, class, value);
    }

    fn push_new(&mut self, class: TokenClass, value: &str) {
        push(&mut self.new, class, value);
    }
}

/// Append, merging into the previous token when the class matches.
fn push(tokens: &mut Vec<Token>, class: TokenClass, value: &str) {
    if value.is_empty() {
        return;
    }
    match tokens.last_mut() {
        Some(last) if last.class == Some(class) => last.value.push_str(value),
        _ => tokens.push(Token::new(class, value)),
    }
}

/// Word-level diff of two values. Replaced word runs are refined at
/// character level.
///
/// Returns `(old side, new side)`. The old side holds equal, delete and
/// replace runs; the new side equal, insert and replace runs.
pub fn diff_tokens(old: &str, new: &str) -> (Vec<Token>, Vec<Token>) {
    let words = TextDiff::from_words(old, new);
    let old_words = words.old_slices();
    let new_words = words.new_slices();
    let mut sides = Sides::default();

    for op in words.ops() {
        let old_run = old_words[op.old_range()].concat();
        let new_run = new_words[op.new_range()].concat();

        match op.tag() {
            DiffTag::Equal => {
                sides.push_old(TokenClass::Equal, &old_run);
                sides.push_new(TokenClass::Equal, &new_run);
            }
            DiffTag::Delete => sides.push_old(TokenClass::Delete, &old_run),
            DiffTag::Insert => sides.push_new(TokenClass::Insert, &new_run),
            DiffTag::Replace => refine(&mut sides, &old_run, &new_run),
        }
    }

    (sides.old, sides.new)
}

fn refine(sides: &mut Sides, old: &str, new: &str) {
    let chars = TextDiff::from_chars(old, new);
    if chars.ratio() < CHAR_REFINE_RATIO {
        sides.push_old(TokenClass::Replace, old);
        sides.push_new(TokenClass::Replace, new);
        return;
    }

    let old_chars = chars.old_slices();
    let new_chars = chars.new_slices();
    for op in chars.ops() {
        let old_run = old_chars[op.old_range()].concat();
        let new_run = new_chars[op.new_range()].concat();

        match op.tag() {
            DiffTag::Equal => {
                sides.push_old(TokenClass::Equal, &old_run);
                sides.push_new(TokenClass::Equal, &new_run);
            }
            DiffTag::Delete => sides.push_old(TokenClass::Delete, &old_run),
            DiffTag::Insert => sides.push_new(TokenClass::Insert, &new_run),
            DiffTag::Replace => {
                sides.push_old(TokenClass::Replace, &old_run);
                sides.push_new(TokenClass::Replace, &new_run);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenClass::*;

    fn joined(tokens: &[Token]) -> String {
        tokens.iter().map(|t| t.value.as_str()).collect()
    }

    #[test]
    fn test_word_insert() {
        let (old, new) = diff_tokens("My Value", "My New Value");

        assert_eq!(old, vec![Token::new(Equal, "My Value")]);
        assert_eq!(
            new,
            vec![
                Token::new(Equal, "My "),
                Token::new(Insert, "New "),
                Token::new(Equal, "Value"),
            ]
        );
    }

    #[test]
    fn test_suffix_refined_by_characters() {
        let (old, new) = diff_tokens("Cruel", "Cruelle");

        assert_eq!(old, vec![Token::new(Equal, "Cruel")]);
        assert_eq!(
            new,
            vec![Token::new(Equal, "Cruel"), Token::new(Insert, "le")]
        );
    }

    #[test]
    fn test_unrelated_words_replaced_whole() {
        let (old, new) = diff_tokens("Open file", "Open xyzzy");

        assert_eq!(old, vec![Token::new(Equal, "Open "), Token::new(Replace, "file")]);
        assert_eq!(new, vec![Token::new(Equal, "Open "), Token::new(Replace, "xyzzy")]);
    }

    #[test]
    fn test_sides_reassemble_values() {
        let cases = [
            ("Attrbute", "Attribute"),
            ("Save the page as", "Save this page now"),
            ("", "brand new"),
            ("gone entirely", ""),
        ];
        for (before, after) in cases {
            let (old, new) = diff_tokens(before, after);
            assert_eq!(joined(&old), before);
            assert_eq!(joined(&new), after);
            assert!(old.iter().all(|t| t.class != Some(Insert)));
            assert!(new.iter().all(|t| t.class != Some(Delete)));
        }
    }

    #[test]
    fn test_plain_token_has_no_class() {
        let json = serde_json::to_value(Token::plain("Other")).unwrap();
        assert_eq!(json, serde_json::json!({"value": "Other"}));

        let json = serde_json::to_value(Token::new(Insert, "le")).unwrap();
        assert_eq!(json, serde_json::json!({"class": "insert", "value": "le"}));
    }
}
