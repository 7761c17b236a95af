use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Minus,
    Plus,
    Slash,
    Star,
    Percent,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    AndAnd,
    OrOr,
    PlusPlus,

    // Literals
    Identifier(String),
    String(String),
    Integer(i64),
    Float(f64),

    // Keywords
    True,
    False,
    Null,
    If,
    Elif,
    Else,
    For,
    In,
    While,
    Try,
    Catch,
    Finally,
    Throw,
    Break,
    Continue,
    Return,
    Echo,
    Import,

    // End of file
    Eof,
}

impl Eq for TokenType {}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::LeftBracket => write!(f, "["),
            TokenType::RightBracket => write!(f, "]"),
            TokenType::Comma => write!(f, ","),
            TokenType::Dot => write!(f, "."),
            TokenType::Colon => write!(f, ":"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Minus => write!(f, "-"),
            TokenType::Plus => write!(f, "+"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Star => write!(f, "*"),
            TokenType::Percent => write!(f, "%"),
            TokenType::Bang => write!(f, "!"),
            TokenType::BangEqual => write!(f, "!="),
            TokenType::Equal => write!(f, "="),
            TokenType::EqualEqual => write!(f, "=="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::AndAnd => write!(f, "&&"),
            TokenType::OrOr => write!(f, "||"),
            TokenType::PlusPlus => write!(f, "++"),
            TokenType::Identifier(name) => write!(f, "{name}"),
            TokenType::String(s) => write!(f, "\"{s}\""),
            TokenType::Integer(n) => write!(f, "{n}"),
            TokenType::Float(n) => write!(f, "{n}"),
            TokenType::True => write!(f, "true"),
            TokenType::False => write!(f, "false"),
            TokenType::Null => write!(f, "null"),
            TokenType::If => write!(f, "if"),
            TokenType::Elif => write!(f, "elif"),
            TokenType::Else => write!(f, "else"),
            TokenType::For => write!(f, "for"),
            TokenType::In => write!(f, "in"),
            TokenType::While => write!(f, "while"),
            TokenType::Try => write!(f, "try"),
            TokenType::Catch => write!(f, "catch"),
            TokenType::Finally => write!(f, "finally"),
            TokenType::Throw => write!(f, "throw"),
            TokenType::Break => write!(f, "break"),
            TokenType::Continue => write!(f, "continue"),
            TokenType::Return => write!(f, "return"),
            TokenType::Echo => write!(f, "echo"),
            TokenType::Import => write!(f, "import"),
            TokenType::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Unexpected character '{character}' at {span}")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("Unterminated string starting at {span}")]
    UnterminatedString { span: Span },
    #[error("Invalid number literal '{lexeme}' at {span}")]
    InvalidNumber { lexeme: String, span: Span },
}

impl TokenizeError {
    pub fn span(&self) -> Span {
        match self {
            TokenizeError::UnexpectedCharacter { span, .. }
            | TokenizeError::UnterminatedString { span }
            | TokenizeError::InvalidNumber { span, .. } => *span,
        }
    }
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut span = Span::new(1, 1);

    loop {
        let rest = skip_trivia(remaining);
        span = span.advance(&remaining[..remaining.len() - rest.len()]);
        remaining = rest;

        let (token_type, rest) = token(remaining, span)?;
        let lexeme = &remaining[..remaining.len() - rest.len()];
        let is_eof = token_type == TokenType::Eof;
        tokens.push(Token {
            token_type,
            lexeme: lexeme.to_string(),
            span,
        });
        if is_eof {
            break;
        }
        span = span.advance(lexeme);
        remaining = rest;
    }

    Ok(tokens)
}

fn skip_trivia(mut source: &str) -> &str {
    while let Some((_, rest)) = maximal(&[whitespace, comment], source) {
        source = rest;
    }
    source
}

fn token(source: &str, span: Span) -> Result<(TokenType, &str), TokenizeError> {
    if source.is_empty() {
        return Ok((TokenType::Eof, source));
    }

    if source.starts_with('"') || source.starts_with('\'') {
        return string(source).ok_or(TokenizeError::UnterminatedString { span });
    }

    if source.starts_with(|c: char| c.is_ascii_digit()) {
        return number(source, span);
    }

    maximal(
        &[
            // Single-character tokens
            left_paren,
            right_paren,
            left_brace,
            right_brace,
            left_bracket,
            right_bracket,
            comma,
            dot,
            colon,
            semicolon,
            minus,
            plus,
            slash,
            star,
            percent,
            // one or two character tokens
            bang,
            bang_equal,
            equal,
            equal_equal,
            greater,
            greater_equal,
            less,
            less_equal,
            and_and,
            or_or,
            plus_plus,
            // keywords
            true_,
            false_,
            null,
            if_,
            elif,
            else_,
            for_,
            in_,
            while_,
            try_,
            catch,
            finally,
            throw,
            break_,
            continue_,
            return_,
            echo,
            import,
            // literals
            identifier,
        ],
        source,
    )
    .ok_or_else(|| TokenizeError::UnexpectedCharacter {
        character: source.chars().next().unwrap_or('\0'),
        span,
    })
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") || source.starts_with('#') {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, &str)> {
            if source.starts_with($word) {
                Some(($token, &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { left_bracket, "[", TokenType::LeftBracket }
match_literal! { right_bracket, "]", TokenType::RightBracket }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { dot, ".", TokenType::Dot }
match_literal! { colon, ":", TokenType::Colon }
match_literal! { semicolon, ";", TokenType::Semicolon }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { star, "*", TokenType::Star }
match_literal! { percent, "%", TokenType::Percent }
match_literal! { bang, "!", TokenType::Bang }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { less, "<", TokenType::Less }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less_equal, "<=", TokenType::LessEqual }
match_literal! { and_and, "&&", TokenType::AndAnd }
match_literal! { or_or, "||", TokenType::OrOr }
match_literal! { plus_plus, "++", TokenType::PlusPlus }
match_literal! { true_, "true", TokenType::True }
match_literal! { false_, "false", TokenType::False }
match_literal! { null, "null", TokenType::Null }
match_literal! { if_, "if", TokenType::If }
match_literal! { elif, "elif", TokenType::Elif }
match_literal! { else_, "else", TokenType::Else }
match_literal! { for_, "for", TokenType::For }
match_literal! { in_, "in", TokenType::In }
match_literal! { while_, "while", TokenType::While }
match_literal! { try_, "try", TokenType::Try }
match_literal! { catch, "catch", TokenType::Catch }
match_literal! { finally, "finally", TokenType::Finally }
match_literal! { throw, "throw", TokenType::Throw }
match_literal! { break_, "break", TokenType::Break }
match_literal! { continue_, "continue", TokenType::Continue }
match_literal! { return_, "return", TokenType::Return }
match_literal! { echo, "echo", TokenType::Echo }
match_literal! { import, "import", TokenType::Import }

fn identifier(source: &str) -> Option<(TokenType, &str)> {
    let mut chars = source.chars();

    let first = chars.next()?;
    if !first.is_alphabetic() && first != '_' {
        return None;
    }

    let len = first.len_utf8()
        + chars
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum::<usize>();

    Some((
        TokenType::Identifier(source[..len].to_string()),
        &source[len..],
    ))
}

fn string(source: &str) -> Option<(TokenType, &str)> {
    let mut chars = source.char_indices();
    let (_, quote) = chars.next()?;
    let mut value = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                let end = i + c.len_utf8();
                return Some((TokenType::String(value), &source[end..]));
            }
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            c => value.push(c),
        }
    }
    None
}

fn number(source: &str, span: Span) -> Result<(TokenType, &str), TokenizeError> {
    let digits = |s: &str| s.chars().take_while(char::is_ascii_digit).count();

    let mut len = digits(source);
    let mut is_float = false;
    let rest = &source[len..];
    if rest.starts_with('.') && digits(&rest[1..]) > 0 {
        is_float = true;
        len += 1 + digits(&rest[1..]);
    }

    let lexeme = &source[..len];
    let invalid = || TokenizeError::InvalidNumber {
        lexeme: lexeme.to_string(),
        span,
    };
    let token_type = if is_float {
        TokenType::Float(lexeme.parse().map_err(|_| invalid())?)
    } else {
        TokenType::Integer(lexeme.parse().map_err(|_| invalid())?)
    };

    Ok((token_type, &source[len..]))
}
