//! Target-keyspace parser
//!
//! Recovers the `bucket.scope.collection` a statement operates on from its
//! text. A small lexer splits the statement into tokens (dropping comments
//! and string literals' content), then a matcher looks for the first target
//! keyword that is not followed by a parenthesized subquery.
//!
//! Failure is never an error: the default triple means "unknown target".

use crate::services::query_analyzer::models::Bsc;

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    /// Back-quoted identifier, unescaped
    Quoted(String),
    StringLit,
    Dot,
    Colon,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Other,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Quoted(w) => Some(w.as_str()),
            _ => None,
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self { chars: input.chars().collect(), pos: 0 }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek(0) {
            match c {
                c if c.is_whitespace() => self.pos += 1,
                '-' if self.peek(1) == Some('-') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '`' => tokens.push(Token::Quoted(self.read_quoted('`'))),
                '\'' | '"' => {
                    self.read_quoted(c);
                    tokens.push(Token::StringLit);
                },
                '.' => self.punct(&mut tokens, Token::Dot),
                ':' => self.punct(&mut tokens, Token::Colon),
                '(' => self.punct(&mut tokens, Token::LParen),
                ')' => self.punct(&mut tokens, Token::RParen),
                ',' => self.punct(&mut tokens, Token::Comma),
                ';' => self.punct(&mut tokens, Token::Semicolon),
                c if is_word_char(c) => tokens.push(Token::Word(self.read_word())),
                _ => self.punct(&mut tokens, Token::Other),
            }
        }

        tokens
    }

    fn punct(&mut self, tokens: &mut Vec<Token>, token: Token) {
        tokens.push(token);
        self.pos += 1;
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.chars.len() {
            if self.peek(0) == Some('*') && self.peek(1) == Some('/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    /// Read a delimited run; doubled delimiters and (outside backticks) backslashes escape
    fn read_quoted(&mut self, delimiter: char) -> String {
        let mut text = String::new();
        self.pos += 1;

        while let Some(c) = self.peek(0) {
            if c == '\\' && delimiter != '`' {
                if let Some(escaped) = self.peek(1) {
                    text.push(escaped);
                }
                self.pos += 2;
                continue;
            }
            if c == delimiter {
                if self.peek(1) == Some(delimiter) {
                    text.push(delimiter);
                    self.pos += 2;
                    continue;
                }
                self.pos += 1;
                break;
            }
            text.push(c);
            self.pos += 1;
        }

        text
    }

    /// Word characters, allowing single hyphens between them (`travel-sample`)
    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek(0) {
            if is_word_char(c) {
                word.push(c);
                self.pos += 1;
            } else if c == '-' && self.peek(1).is_some_and(is_word_char) {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ============================================================================
// Matcher
// ============================================================================

/// Keywords that may terminate a keyspace reference (after an optional alias)
const STOP_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "USE", "USING", "LET", "NEST", "UNNEST", "GROUP", "ORDER", "LIMIT", "ON",
    "AS", "SET", "VALUES", "KEY", "RETURNING", "WHEN", "INNER", "LEFT", "RIGHT", "OUTER", "CROSS",
    "UNION", "INTERSECT", "EXCEPT", "OFFSET", "HAVING", "SELECT", "UNSET",
];

/// Keywords that may follow a named `PREPARE`
const STATEMENT_STARTS: &[&str] =
    &["SELECT", "UPDATE", "DELETE", "INSERT", "UPSERT", "MERGE", "WITH", "FROM"];

/// Keywords preceding `INTO` that introduce a target
const INTO_VERBS: &[&str] = &["INSERT", "UPSERT", "MERGE"];

const MAX_PATH_PARTS: usize = 3;

/// Parser for statement target keyspaces
pub struct KeyspaceParser;

impl KeyspaceParser {
    /// Target `bucket.scope.collection`, `_default._default._default` if unknown
    pub fn parse_target(statement: &str) -> Bsc {
        let tokens = Lexer::new(statement).tokenize();
        let body = Self::strip_prepare(&tokens);
        Self::find_target(body).unwrap_or_default()
    }

    /// Keyspace an index definition (`CREATE [PRIMARY] INDEX ... ON ...`) targets
    pub fn parse_index_target(definition: &str) -> Option<Bsc> {
        let tokens = Lexer::new(definition).tokenize();
        let on = tokens.iter().position(|t| t.is_keyword("ON"))?;
        Self::parse_reference(&tokens[on + 1..])
    }

    /// True for `CREATE PRIMARY INDEX ...` definitions
    pub fn is_primary_definition(definition: &str) -> bool {
        let tokens = Lexer::new(definition).tokenize();
        matches!(
            tokens.as_slice(),
            [create, primary, index, ..]
                if create.is_keyword("CREATE") && primary.is_keyword("PRIMARY") && index.is_keyword("INDEX")
        )
    }

    /// Drop `PREPARE name FROM|AS` or a bare `PREPARE`
    fn strip_prepare(tokens: &[Token]) -> &[Token] {
        if !tokens.first().is_some_and(|t| t.is_keyword("PREPARE")) {
            return tokens;
        }

        let named = tokens.get(1).and_then(Token::identifier).is_some()
            && tokens.get(2).is_some_and(|t| t.is_keyword("FROM") || t.is_keyword("AS"))
            && tokens
                .get(3)
                .is_some_and(|t| STATEMENT_STARTS.iter().any(|kw| t.is_keyword(kw)) || *t == Token::LParen);

        if named { &tokens[3..] } else { &tokens[1..] }
    }

    /// First target keyword not followed by `(`
    fn find_target(tokens: &[Token]) -> Option<Bsc> {
        for (i, token) in tokens.iter().enumerate() {
            let introduces_target = token.is_keyword("FROM")
                || token.is_keyword("UPDATE")
                || (token.is_keyword("INTO")
                    && i > 0
                    && INTO_VERBS.iter().any(|verb| tokens[i - 1].is_keyword(verb)));

            if !introduces_target {
                continue;
            }

            match tokens.get(i + 1) {
                Some(Token::LParen) | None => continue,
                Some(_) => return Self::parse_reference(&tokens[i + 1..]),
            }
        }
        None
    }

    /// `[namespace:]part[.part[.part]] [[AS] alias]` followed by a terminator
    fn parse_reference(tokens: &[Token]) -> Option<Bsc> {
        let mut pos = 0;

        // Namespace prefix, e.g. `default:`
        if tokens.first().and_then(Token::identifier).is_some()
            && tokens.get(1) == Some(&Token::Colon)
        {
            pos = 2;
        }

        let mut parts: Vec<&str> = Vec::with_capacity(MAX_PATH_PARTS);
        loop {
            let part = tokens.get(pos).and_then(Token::identifier)?;
            if !Self::is_valid_part(part) {
                return None;
            }
            parts.push(part);
            pos += 1;

            if tokens.get(pos) != Some(&Token::Dot) {
                break;
            }
            if parts.len() == MAX_PATH_PARTS {
                return None;
            }
            pos += 1;
        }

        // Alias
        match tokens.get(pos) {
            Some(t) if t.is_keyword("AS") => {
                tokens.get(pos + 1).and_then(Token::identifier)?;
                pos += 2;
            },
            Some(Token::Word(w)) if !Self::is_stop_keyword(w) => pos += 1,
            Some(Token::Quoted(_)) => pos += 1,
            _ => {},
        }

        let terminated = match tokens.get(pos) {
            None => true,
            Some(Token::Comma | Token::RParen | Token::LParen | Token::Semicolon) => true,
            Some(Token::Word(w)) => Self::is_stop_keyword(w),
            Some(_) => false,
        };

        if !terminated {
            return None;
        }

        Some(Bsc::from_parts(parts[0], parts.get(1).copied(), parts.get(2).copied()))
    }

    fn is_stop_keyword(word: &str) -> bool {
        STOP_KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw))
    }

    /// Conservative identifier class
    fn is_valid_part(part: &str) -> bool {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '%' | '-'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(statement: &str) -> String {
        KeyspaceParser::parse_target(statement).to_string()
    }

    #[test]
    fn test_delete_with_backquoted_path_and_alias() {
        assert_eq!(
            target("DELETE FROM `travel-sample`.`inventory`.`hotel` h WHERE h.id = 5"),
            "travel-sample.inventory.hotel"
        );
    }

    #[test]
    fn test_update_single_part() {
        assert_eq!(target("UPDATE hotel SET x=1"), "hotel._default._default");
    }

    #[test]
    fn test_select_forms() {
        assert_eq!(target("SELECT * FROM `beer-sample`"), "beer-sample._default._default");
        assert_eq!(target("select name from travel.inventory where x = 1"), "travel.inventory._default");
        assert_eq!(
            target("SELECT a.* FROM default:`travel-sample`.inventory.airline AS a LIMIT 5"),
            "travel-sample.inventory.airline"
        );
        assert_eq!(
            target("SELECT * FROM b.s.c t1 INNER JOIN b.s.d t2 ON t1.x = t2.y"),
            "b.s.c"
        );
        assert_eq!(target("SELECT * FROM b USE KEYS ['k1']"), "b._default._default");
        assert_eq!(target("SELECT count(*) FROM system:completed_requests"), "completed_requests._default._default");
    }

    #[test]
    fn test_insert_upsert_merge() {
        assert_eq!(
            target("INSERT INTO `travel-sample`.inventory.hotel (KEY, VALUE) VALUES ('k', {})"),
            "travel-sample.inventory.hotel"
        );
        assert_eq!(target("UPSERT INTO orders VALUES ('k', {})"), "orders._default._default");
        assert_eq!(
            target("MERGE INTO b.s.target t USING b.s.source s ON t.id = s.id WHEN MATCHED THEN UPDATE SET t.v = s.v"),
            "b.s.target"
        );
    }

    #[test]
    fn test_skips_parenthesized_subquery() {
        assert_eq!(target("INSERT INTO (SELECT * FROM x)"), "x._default._default");
        assert_eq!(
            target("SELECT * FROM (SELECT raw 1) AS sub"),
            "_default._default._default"
        );
        assert_eq!(
            target("SELECT s.* FROM (SELECT * FROM `b`.`s`.`c`) s"),
            "b.s.c"
        );
    }

    #[test]
    fn test_prepare_prefixes() {
        assert_eq!(target("PREPARE p1 FROM SELECT * FROM hotel WHERE id = $1"), "hotel._default._default");
        assert_eq!(target("PREPARE `p-2` AS UPDATE b.s.c SET a = 1"), "b.s.c");
        assert_eq!(target("PREPARE SELECT * FROM airline"), "airline._default._default");
    }

    #[test]
    fn test_comments_are_ignored() {
        assert_eq!(
            target("/* FROM fake */ SELECT * -- FROM other\n FROM real_one WHERE a = 1"),
            "real_one._default._default"
        );
    }

    #[test]
    fn test_string_literals_are_opaque() {
        assert_eq!(target("SELECT 'FROM fake' AS x FROM hotel"), "hotel._default._default");
    }

    #[test]
    fn test_index_definition_target() {
        let bsc = KeyspaceParser::parse_index_target(
            "CREATE INDEX def_inventory_hotel_city ON `travel-sample`.`inventory`.`hotel`(`city`)",
        );
        assert_eq!(bsc.unwrap().to_string(), "travel-sample.inventory.hotel");

        let bsc = KeyspaceParser::parse_index_target("CREATE PRIMARY INDEX `#primary` ON `beer-sample`");
        assert_eq!(bsc.unwrap().to_string(), "beer-sample._default._default");

        assert!(KeyspaceParser::parse_index_target("CREATE INDEX broken").is_none());
    }

    #[test]
    fn test_invalid_or_missing_targets() {
        assert!(KeyspaceParser::parse_target("SELECT 1").is_default());
        assert!(KeyspaceParser::parse_target("").is_default());
        assert!(KeyspaceParser::parse_target("SELECT * FROM a.b.c.d").is_default());
        assert!(KeyspaceParser::parse_target("SELECT * FROM `bad name`").is_default());
        // Garbage after the reference
        assert!(KeyspaceParser::parse_target("SELECT * FROM hotel h extra stuff").is_default());
    }

    #[test]
    fn test_primary_definition_detection() {
        assert!(KeyspaceParser::is_primary_definition("CREATE PRIMARY INDEX `#primary` ON `beer-sample`"));
        assert!(KeyspaceParser::is_primary_definition("/* gsi */ create primary index on hotel"));
        assert!(!KeyspaceParser::is_primary_definition("CREATE INDEX primary_like ON hotel(x)"));
        assert!(!KeyspaceParser::is_primary_definition(""));
    }
}
