//! Text rewrites applied to `.proto` sources before they reach the parser.
//!
//! Schemas captured from real applications often contain constructs that other toolchains
//! accept but a strict parser rejects. Two such constructs are rewritten here:
//!
//! - Sibling enums within one message declaring the same value name, such as `UNKNOWN = 0` in
//!   several nested enums. Enum values share the scope of the enclosing message, so every
//!   occurrence after the first is renamed with a prefix derived from its enum's name. Field
//!   defaults referring to a renamed value are updated to the new name.
//! - Option values written as text format literals delimited by `<` and `>` instead of braces.
//!
//! Both passes work on a token stream that skips comments and string literals, and both leave
//! the source untouched when there is nothing to fix. Neither pass reports errors: a genuine
//! defect is left in place for the parser or the builder to report.

use log::debug;
use std::borrow::Cow;
use std::collections::HashMap;

/// Applies every lenient rewrite to the source.
pub fn repair(source: &str) -> Cow<'_, str>
{
    let enums = repair_duplicate_enum_values(source);
    let options = match repair_angle_bracket_options(&enums) {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    };

    match options {
        Some(s) => Cow::Owned(s),
        None => enums,
    }
}

/// Short code identifying an enum, used to prefix renamed values.
///
/// An all-uppercase name is used whole, otherwise the uppercase letters are concatenated. A
/// name without any uppercase letters is represented by its first character.
///
/// ```
/// use protosniff::schema::lenient::enum_prefix;
///
/// assert_eq!(enum_prefix("MessageType"), "MT");
/// assert_eq!(enum_prefix("ALLCAPS"), "ALLCAPS");
/// assert_eq!(enum_prefix("type"), "t");
/// ```
pub fn enum_prefix(name: &str) -> String
{
    let has_upper = name.chars().any(char::is_uppercase);
    if has_upper && !name.chars().any(char::is_lowercase) {
        return name.to_string();
    }

    if has_upper {
        return name.chars().filter(|c| c.is_uppercase()).collect();
    }

    name.chars().take(1).collect()
}

/// Renames enum values that collide with a value of a sibling enum in the same message.
///
/// The first declaration keeps its name, later ones become `<PREFIX>_<NAME>`. A name repeated
/// within a single enum is not a sibling collision and is left for the builder to reject.
/// Field defaults naming a renamed value are rewritten along with it.
pub fn repair_duplicate_enum_values(source: &str) -> Cow<'_, str>
{
    let tokens: Vec<Token> = Scanner::new(source).collect();
    let mut edits = vec![];

    let mut frames: Vec<Frame> = vec![];
    let mut pending: Option<Frame> = None;

    // Value name -> index of the enum frame that declared it first. One map per open message.
    let mut seen: Vec<HashMap<&str, usize>> = vec![];

    // Every enum by its path within the file, with the values renamed in it.
    let mut renamed: HashMap<String, HashMap<&str, String>> = HashMap::new();
    let mut defaults = vec![];

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Symbol('{') => {
                let frame = pending.take().unwrap_or(Frame::Other);
                match frame {
                    Frame::Message { .. } => seen.push(HashMap::new()),
                    Frame::Enum { name, .. } => {
                        renamed.entry(enum_path(&frames, name)).or_default();
                    }
                    Frame::Other => {}
                }
                frames.push(frame);
            }
            TokenKind::Symbol('}') => {
                if let Some(Frame::Message { .. }) = frames.pop() {
                    seen.pop();
                }
            }
            TokenKind::Symbol(';') => pending = None,
            TokenKind::Ident => {
                let text = token.text(source);
                let next = tokens.get(i + 1);
                let next_name = next
                    .filter(|t| t.kind == TokenKind::Ident)
                    .map(|t| t.text(source));
                let next_is_assign =
                    next.map(|t| t.kind == TokenKind::Symbol('=')).unwrap_or(false);
                let statement_start = i == 0 || tokens[i - 1].is_statement_end();

                match (text, next_name) {
                    ("message", Some(name)) if statement_start => {
                        pending = Some(Frame::Message { name });
                    }
                    // `[label] group Name = 1 { ... }` declares a nested message.
                    ("group", Some(name))
                        if tokens.get(i + 2).map(|t| t.kind) == Some(TokenKind::Symbol('=')) =>
                    {
                        pending = Some(Frame::Message { name });
                    }
                    ("enum", Some(name)) if statement_start => {
                        pending = Some(Frame::Enum { name, start: i });
                    }
                    ("default", None) if next_is_assign && !statement_start => {
                        if let Some(reference) = default_reference(&tokens, i, source, &frames) {
                            defaults.push(reference);
                        }
                    }
                    (_, None) if statement_start && next_is_assign => {
                        // An enum value, but only counts when the enum sits directly in a message.
                        let parent_is_message = frames.len() >= 2
                            && matches!(frames[frames.len() - 2], Frame::Message { .. });
                        if let (Some(Frame::Enum { name, start }), true) =
                            (frames.last(), parent_is_message)
                        {
                            if let Some(scope) = seen.last_mut() {
                                match scope.get(text) {
                                    Some(owner) if owner != start => {
                                        let replacement = format!("{}_{}", enum_prefix(name), text);
                                        renamed
                                            .entry(enum_path(&frames, name))
                                            .or_default()
                                            .insert(text, replacement.clone());
                                        edits.push(token.replace_with(&replacement));
                                    }
                                    Some(_) => {}
                                    None => {
                                        scope.insert(text, *start);
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if edits.is_empty() {
        return Cow::Borrowed(source);
    }
    debug!("Renamed {} duplicate enum value(s)", edits.len());

    for reference in defaults {
        let replacement = resolve_enum(&renamed, &reference.scope, &reference.type_name)
            .and_then(|values| values.get(reference.value.text(source)));
        if let Some(replacement) = replacement {
            edits.push(reference.value.replace_with(replacement));
        }
    }

    apply_edits(source, edits)
}

/// A `default = VALUE` field option, recorded until every enum in the file has been seen.
struct DefaultRef<'a>
{
    /// Names of the messages enclosing the field.
    scope: Vec<&'a str>,
    type_name: String,
    value: Token,
}

/// Reads the `default` option at `i` and the type of the field declaring it.
///
/// Returns `None` unless the option sits in the `[...]` list of a `TYPE NAME = NUMBER` field and
/// its value is an identifier.
fn default_reference<'a>(
    tokens: &[Token],
    i: usize,
    source: &'a str,
    frames: &[Frame<'a>],
) -> Option<DefaultRef<'a>>
{
    let previous = tokens.get(i.checked_sub(1)?)?.kind;
    if !matches!(previous, TokenKind::Symbol('[') | TokenKind::Symbol(',')) {
        return None;
    }
    let value = *tokens.get(i + 2)?;
    if value.kind != TokenKind::Ident {
        return None;
    }

    let mut open = i;
    let mut depth = 0usize;
    loop {
        open = open.checked_sub(1)?;
        match tokens[open].kind {
            TokenKind::Symbol(']') => depth += 1,
            TokenKind::Symbol('[') if depth == 0 => break,
            TokenKind::Symbol('[') => depth -= 1,
            _ => {}
        }
    }

    let declaration = [
        TokenKind::Ident,
        TokenKind::Ident,
        TokenKind::Symbol('='),
        TokenKind::Number,
    ];
    let type_end = open.checked_sub(4)?;
    if tokens[type_end..open].iter().map(|t| t.kind).ne(declaration) {
        return None;
    }

    // A dotted type name is written without spaces, so it spans adjacent tokens.
    let mut type_start = type_end;
    while type_start > 0
        && tokens[type_start - 1].end == tokens[type_start].start
        && matches!(
            tokens[type_start - 1].kind,
            TokenKind::Ident | TokenKind::Symbol('.')
        )
    {
        type_start -= 1;
    }

    Some(DefaultRef {
        scope: message_path(frames),
        type_name: tokens[type_start..=type_end]
            .iter()
            .map(|t| t.text(source))
            .collect(),
        value,
    })
}

/// Finds the enum a field type refers to, searching from the innermost message outwards.
///
/// Package names aren't tracked, so a name that resolves nowhere is matched by its longest
/// suffix naming a known enum.
fn resolve_enum<'m, V>(enums: &'m HashMap<String, V>, scope: &[&str], type_name: &str)
    -> Option<&'m V>
{
    let relative = match type_name.strip_prefix('.') {
        Some(absolute) => absolute,
        None => {
            let scoped = (0..=scope.len()).rev().find_map(|depth| {
                let mut path = scope[..depth].join(".");
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(type_name);
                enums.get(&path)
            });
            if scoped.is_some() {
                return scoped;
            }
            type_name
        }
    };

    let segments: Vec<&str> = relative.split('.').collect();
    (0..segments.len()).find_map(|i| enums.get(&segments[i..].join(".")))
}

fn message_path<'a>(frames: &[Frame<'a>]) -> Vec<&'a str>
{
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Message { name } => Some(*name),
            _ => None,
        })
        .collect()
}

fn enum_path<'a>(frames: &[Frame<'a>], name: &'a str) -> String
{
    let mut path = message_path(frames);
    path.push(name);
    path.join(".")
}

/// Rewrites `<...>` text format literals in option values into `{...}`.
///
/// Only values that directly follow `=` inside a `[...]` option list or an `option` statement
/// are touched. Nested literals are converted level by level. A literal that never closes is
/// left as is.
pub fn repair_angle_bracket_options(source: &str) -> Cow<'_, str>
{
    let tokens: Vec<Token> = Scanner::new(source).collect();
    let mut edits = vec![];

    let mut bracket_depth = 0usize;
    let mut in_option_statement = false;

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match token.kind {
            TokenKind::Symbol('[') => bracket_depth += 1,
            TokenKind::Symbol(']') => bracket_depth = bracket_depth.saturating_sub(1),
            TokenKind::Symbol(';') => in_option_statement = false,
            TokenKind::Ident if token.text(source) == "option" => {
                if i == 0 || tokens[i - 1].is_statement_end() {
                    in_option_statement = true;
                }
            }
            TokenKind::Symbol('=') if bracket_depth > 0 || in_option_statement => {
                let starts_literal = matches!(
                    tokens.get(i + 1).map(|t| t.kind),
                    Some(TokenKind::Symbol('<')) | Some(TokenKind::Symbol('{'))
                );
                if starts_literal {
                    if let Some((end, mut literal_edits)) = convert_literal(&tokens, i + 1) {
                        edits.append(&mut literal_edits);
                        i = end;
                        continue;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    if !edits.is_empty() {
        debug!("Rewrote {} angle bracket delimiter(s) in option values", edits.len());
    }

    apply_edits(source, edits)
}

/// Walks a text format literal starting at `open`.
///
/// Returns the index just past the closing delimiter and the edits turning every angle bracket
/// pair in it into braces, or `None` if the literal isn't closed.
fn convert_literal(tokens: &[Token], open: usize) -> Option<(usize, Vec<Edit>)>
{
    let mut stack = vec![];
    let mut edits = vec![];

    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Symbol(c @ '<') | TokenKind::Symbol(c @ '{') => {
                stack.push(c);
                if c == '<' {
                    edits.push(token.replace_with("{"));
                }
            }
            TokenKind::Symbol(c @ '>') | TokenKind::Symbol(c @ '}') => {
                match (stack.pop(), c) {
                    (Some('<'), '>') => edits.push(token.replace_with("}")),
                    (Some('{'), '}') => {}

                    // Mismatched delimiters. Leave the whole literal for the parser to report.
                    _ => return None,
                }
                if stack.is_empty() {
                    return Some((i + 1, edits));
                }
            }
            _ => {}
        }
    }

    None
}

#[derive(Clone, Copy)]
enum Frame<'a>
{
    Message
    {
        name: &'a str,
    },
    Enum
    {
        name: &'a str,

        // Token index of the `enum` keyword, identifying the enum.
        start: usize,
    },
    Other,
}

struct Edit
{
    start: usize,
    end: usize,
    replacement: String,
}

fn apply_edits(source: &str, mut edits: Vec<Edit>) -> Cow<'_, str>
{
    if edits.is_empty() {
        return Cow::Borrowed(source);
    }

    edits.sort_by_key(|e| e.start);

    let mut output = String::with_capacity(source.len() + edits.len() * 4);
    let mut cursor = 0;
    for edit in edits {
        output.push_str(&source[cursor..edit.start]);
        output.push_str(&edit.replacement);
        cursor = edit.end;
    }
    output.push_str(&source[cursor..]);

    Cow::Owned(output)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenKind
{
    Ident,
    Number,
    String,
    Symbol(char),
}

#[derive(Debug, Clone, Copy)]
struct Token
{
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token
{
    fn text<'a>(&self, source: &'a str) -> &'a str
    {
        &source[self.start..self.end]
    }

    fn is_statement_end(&self) -> bool
    {
        matches!(
            self.kind,
            TokenKind::Symbol(';') | TokenKind::Symbol('{') | TokenKind::Symbol('}')
        )
    }

    fn replace_with(&self, replacement: &str) -> Edit
    {
        Edit {
            start: self.start,
            end: self.end,
            replacement: replacement.to_string(),
        }
    }
}

/// Splits proto source into tokens, dropping whitespace and comments.
///
/// The scanner never fails. Unterminated strings and comments run to the end of the line or
/// the input, which is enough to keep their content away from the rewrites.
struct Scanner<'a>
{
    source: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a>
{
    fn new(source: &'a str) -> Self
    {
        Scanner { source, pos: 0 }
    }

    fn peek(&self) -> Option<char>
    {
        self.source[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char>
    {
        self.source[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char>
    {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn bump_while(&mut self, predicate: impl Fn(char) -> bool)
    {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Skips whitespace and comments. Returns false once the input is exhausted.
    fn skip_trivia(&mut self) -> bool
    {
        loop {
            match (self.peek(), self.peek_second()) {
                (None, _) => return false,
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => self.bump_while(|c| c != '\n'),
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    match self.source[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => self.pos = self.source.len(),
                    }
                }
                _ => return true,
            }
        }
    }

    fn string(&mut self, quote: char)
    {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '\n' => break,
                c if c == quote => break,
                _ => {}
            }
        }
    }
}

impl<'a> Iterator for Scanner<'a>
{
    type Item = Token;

    fn next(&mut self) -> Option<Token>
    {
        if !self.skip_trivia() {
            return None;
        }

        let start = self.pos;
        let c = self.bump()?;
        let kind = match c {
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.bump_while(|c| c.is_ascii_alphanumeric() || c == '_');
                TokenKind::Ident
            }
            c if c.is_ascii_digit() => {
                let mut previous = c;
                while let Some(c) = self.peek() {
                    let exponent_sign =
                        (c == '+' || c == '-') && (previous == 'e' || previous == 'E');
                    if !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign) {
                        break;
                    }
                    previous = c;
                    self.bump();
                }
                TokenKind::Number
            }
            '"' | '\'' => {
                self.string(c);
                TokenKind::String
            }
            c => TokenKind::Symbol(c),
        };

        Some(Token {
            kind,
            start,
            end: self.pos,
        })
    }
}

#[cfg(test)]
mod test
{
    use super::*;
    use crate::schema::{CompileError, Constant, SchemaSet};

    #[test]
    fn prefixes()
    {
        assert_eq!(enum_prefix("MessageType"), "MT");
        assert_eq!(enum_prefix("MessageStatus"), "MS");
        assert_eq!(enum_prefix("GroupType"), "GT");
        assert_eq!(enum_prefix("Status"), "S");
        assert_eq!(enum_prefix("ALLCAPS"), "ALLCAPS");
        assert_eq!(enum_prefix("type"), "t");
    }

    const SIBLING_ENUMS: &str = r#"
        syntax = "proto3";
        package chat;

        message Envelope {
            enum MessageType {
                UNKNOWN = 0;
                FOO = 1;
            }
            enum MessageStatus {
                UNKNOWN = 0;
                BAR = 1;
            }
            MessageType type = 1;
            MessageStatus status = 2;
        }
    "#;

    #[test]
    fn sibling_enum_values_are_renamed()
    {
        let repaired = repair_duplicate_enum_values(SIBLING_ENUMS);

        assert_eq!(repaired.matches(" UNKNOWN = 0").count(), 1);
        assert!(repaired.contains("MS_UNKNOWN = 0;"));
        assert!(repaired.contains("FOO = 1;"));
        assert!(repaired.contains("BAR = 1;"));
        assert!(repaired.contains("enum MessageType {"));
        assert!(repaired.contains("enum MessageStatus {"));
    }

    #[test]
    fn sibling_enum_values_compile_after_repair()
    {
        match SchemaSet::parse(&[SIBLING_ENUMS]) {
            Err(CompileError::DuplicateEnumValue { .. }) => {}
            other => panic!("Strict parse should fail: {:?}", other.map(|_| ())),
        }

        let set = SchemaSet::compile(vec![("chat.proto", SIBLING_ENUMS)]).unwrap();
        let status = set.get_enum("chat.Envelope.MessageStatus").unwrap();
        assert_eq!(status.get_field_by_value(0).unwrap().name, "MS_UNKNOWN");
        assert_eq!(status.get_field_by_value(1).unwrap().name, "BAR");

        let kind = set.get_enum("chat.Envelope.MessageType").unwrap();
        assert_eq!(kind.get_field_by_value(0).unwrap().name, "UNKNOWN");
    }

    #[test]
    fn unrelated_enums_are_untouched()
    {
        let source = r#"
            enum TopLevel { UNKNOWN = 0; }
            message A {
                enum Kind { UNKNOWN = 0; }
                // enum Fake { UNKNOWN = 0; }
                string note = 1 [default = "enum Fake { UNKNOWN = 0; }"];
            }
            message B {
                enum Kind { UNKNOWN = 0; }
            }
        "#;

        assert!(matches!(
            repair_duplicate_enum_values(source),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn nested_messages_have_their_own_scope()
    {
        let source = r#"
            message Outer {
                enum Color { NONE = 0; }
                message Inner {
                    enum Shape { NONE = 0; }
                    enum Size { NONE = 0; }
                }
            }
        "#;

        let repaired = repair_duplicate_enum_values(source);
        assert!(repaired.contains("enum Color { NONE = 0; }"));
        assert!(repaired.contains("enum Shape { NONE = 0; }"));
        assert!(repaired.contains("enum Size { S_NONE = 0; }"));
    }

    #[test]
    fn duplicate_within_one_enum_is_kept()
    {
        let source = "message M { enum E { A = 0; A = 1; } }";
        assert!(matches!(
            repair_duplicate_enum_values(source),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn defaults_follow_renamed_values()
    {
        let source = r#"
            syntax = "proto2";
            message M {
                enum A { UNKNOWN = 0; }
                enum B { UNKNOWN = 0; KNOWN = 1; }
                optional B b = 1 [default = UNKNOWN];
                optional M.B qualified = 2 [deprecated = true, default = UNKNOWN];
                optional A a = 3 [default = UNKNOWN];
                optional B known = 4 [default = KNOWN];
            }
            message Other {
                enum B { UNKNOWN = 0; }
                optional B b = 1 [default = UNKNOWN];
            }
        "#;

        let repaired = repair_duplicate_enum_values(source);
        assert!(repaired.contains("optional B b = 1 [default = B_UNKNOWN];"));
        assert!(repaired.contains("qualified = 2 [deprecated = true, default = B_UNKNOWN];"));
        assert!(repaired.contains("optional A a = 3 [default = UNKNOWN];"));
        assert!(repaired.contains("optional B known = 4 [default = KNOWN];"));
        assert_eq!(repaired.matches("[default = UNKNOWN]").count(), 2);

        let set = SchemaSet::compile(vec![("m.proto", source)]).unwrap();
        let b = set.get_message("M").unwrap().get_field_by_name("b").unwrap();
        assert_eq!(b.options[0].name, "default");
        assert_eq!(b.options[0].value, Constant::Ident("B_UNKNOWN".to_string()));
    }

    #[test]
    fn groups_are_message_scopes()
    {
        let source = r#"
            message Search {
                repeated group Result = 1 {
                    enum Kind { NONE = 0; }
                    enum Rank { NONE = 0; }
                    optional Kind kind = 2;
                }
                enum Sort { NONE = 0; }
            }
        "#;

        let repaired = repair_duplicate_enum_values(source);
        assert!(repaired.contains("enum Kind { NONE = 0; }"));
        assert!(repaired.contains("enum Rank { R_NONE = 0; }"));
        assert!(repaired.contains("enum Sort { NONE = 0; }"));
    }

    #[test]
    fn genuine_defects_still_fail()
    {
        let source = r#"
            syntax = "proto3";
            message M {
                enum First { UNKNOWN = 0; }
                enum Second { UNKNOWN = 0; }
                string name = 1;
                int32 name = 2;
            }
        "#;

        match SchemaSet::compile(vec![("m.proto", source)]) {
            Err(CompileError::DuplicateFieldName { name, .. }) => assert_eq!(name, "name"),
            other => panic!("Expected a duplicate field error: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn angle_brackets_in_field_options()
    {
        assert_eq!(
            repair_angle_bracket_options(r#"int32 a = 1 [(opt) = <name: "test">];"#),
            r#"int32 a = 1 [(opt) = {name: "test"}];"#
        );
    }

    #[test]
    fn nested_angle_brackets()
    {
        assert_eq!(
            repair_angle_bracket_options("option (o) = <foo: <bar: 1>>;"),
            "option (o) = {foo: {bar: 1}};"
        );
        assert_eq!(
            repair_angle_bracket_options("int32 a = 1 [(o) = {foo: <bar: 1>}];"),
            "int32 a = 1 [(o) = {foo: {bar: 1}}];"
        );
    }

    #[test]
    fn map_declarations_are_untouched()
    {
        for source in &[
            "map<string, int32> counts = 1;",
            "map<string, SomeMessage> items = 2 [(o) = true];",
            "map<int64,pkg.Value> values = 3;",
        ] {
            assert!(matches!(
                repair_angle_bracket_options(source),
                Cow::Borrowed(_)
            ));
        }
    }

    #[test]
    fn strings_and_comments_are_untouched()
    {
        for source in &[
            r#"int32 a = 1 [(o) = "<not: 1>"];"#,
            "int32 a = 1; // [(o) = <not: 1>]",
            "/* option (o) = <not: 1>; */ int32 a = 1;",
        ] {
            assert!(matches!(
                repair_angle_bracket_options(source),
                Cow::Borrowed(_)
            ));
        }
    }

    #[test]
    fn string_contents_inside_literals_survive()
    {
        assert_eq!(
            repair_angle_bracket_options(r#"option (o) = <text: "a > b" other: <x: 1>>;"#),
            r#"option (o) = {text: "a > b" other: {x: 1}};"#
        );
    }

    #[test]
    fn unclosed_literal_is_left_alone()
    {
        let source = "option (o) = <foo: 1;";
        assert!(matches!(
            repair_angle_bracket_options(source),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn angle_bracket_options_compile_after_repair()
    {
        let source = r#"
            syntax = "proto2";
            package opts;
            message Options {
                option (message_opt) = <flags: <verbose: true> label: "x">;
                optional int32 count = 1 [(field_opt) = <limit: 10>, deprecated = true];
                map<string, Options> children = 2;
            }
        "#;

        let set = SchemaSet::compile(vec![("opts.proto", source)]).unwrap();
        let options = set.get_message("opts.Options").unwrap();
        assert_eq!(options.field_count(), 2);
        assert_eq!(set.message_types(), &["opts.Options".to_string()]);
    }
}
