//! Parser for the `{name="value", ...}` label text form

use super::{is_valid_label_name, LabelError, LabelSet};
use std::iter::Peekable;
use std::str::CharIndices;

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    fn error(&mut self, reason: impl Into<String>) -> LabelError {
        LabelError::Syntax {
            offset: self.offset(),
            reason: reason.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LabelError> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some((_, c)) if *c == expected => {
                self.chars.next();
                Ok(())
            }
            Some((_, c)) => {
                let c = *c;
                Err(self.error(format!("expected '{}', found '{}'", expected, c)))
            }
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_is(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        matches!(self.chars.peek(), Some((_, c)) if *c == expected)
    }

    fn name(&mut self) -> Result<String, LabelError> {
        self.skip_whitespace();
        let start = self.offset();
        while matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_alphanumeric() || *c == '_') {
            self.chars.next();
        }
        let end = self.offset();
        let input = self.input;
        let name = &input[start..end];

        if name.is_empty() {
            return Err(self.error("expected label name"));
        }
        if !is_valid_label_name(name) {
            return Err(LabelError::InvalidName(name.to_string()));
        }
        Ok(name.to_string())
    }

    fn quoted(&mut self) -> Result<String, LabelError> {
        self.expect('"')?;
        let mut value = String::new();

        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(value),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, c)) => return Err(self.error(format!("invalid escape '\\{}'", c))),
                    None => return Err(self.error("unterminated string")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

/// Parse the text form of a label set
pub fn parse_labels(input: &str) -> Result<LabelSet, LabelError> {
    let mut parser = Parser::new(input);
    let mut set = LabelSet::new();

    parser.expect('{')?;

    if !parser.peek_is('}') {
        loop {
            let name = parser.name()?;
            parser.expect('=')?;
            let value = parser.quoted()?;

            if set.has(&name) {
                return Err(LabelError::DuplicateName(name));
            }
            set.insert(name, value)?;

            if parser.peek_is(',') {
                parser.chars.next();
                if parser.peek_is('}') {
                    break;
                }
            } else {
                break;
            }
        }
    }

    parser.expect('}')?;
    parser.skip_whitespace();
    if parser.chars.peek().is_some() {
        return Err(parser.error("unexpected trailing input"));
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let set = parse_labels(r#"{__name__="spans", env="prod"}"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("__name__"), Some("spans"));
        assert_eq!(set.get("env"), Some("prod"));
    }

    #[test]
    fn test_parse_whitespace_and_trailing_comma() {
        let set = parse_labels("  { b = \"2\" ,a=\"1\", }  ").unwrap();
        assert_eq!(set.to_string(), r#"{a="1", b="2"}"#);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_labels("{}").unwrap().is_empty());
        assert!(parse_labels("{ }").unwrap().is_empty());
    }

    #[test]
    fn test_parse_escapes() {
        let set = parse_labels(r#"{tags="a=\"x\",b=c\\d\n"}"#).unwrap();
        assert_eq!(set.get("tags"), Some("a=\"x\",b=c\\d\n"));
    }

    #[test]
    fn test_display_parse_agree() {
        let original = LabelSet::from_pairs([
            ("tags", "k=\"v\"\t"),
            ("warnings", ""),
            ("operation_name", "GET /users/{id}"),
        ])
        .unwrap();
        let parsed = parse_labels(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_labels(""), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("a=\"b\""), Err(LabelError::Syntax { offset: 0, .. })));
        assert!(matches!(parse_labels("{a=\"b\""), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{a=\"b}"), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{a \"b\"}"), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{a=b}"), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{a=\"\\q\"}"), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{a=\"b\"} x"), Err(LabelError::Syntax { .. })));
        assert!(matches!(parse_labels("{=\"b\"}"), Err(LabelError::Syntax { .. })));
    }

    #[test]
    fn test_parse_name_errors() {
        assert_eq!(
            parse_labels("{9a=\"b\"}"),
            Err(LabelError::InvalidName("9a".to_string()))
        );
        assert_eq!(
            parse_labels("{a=\"1\", a=\"2\"}"),
            Err(LabelError::DuplicateName("a".to_string()))
        );
    }
}
