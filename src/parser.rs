use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::{
    ast::{Block, CatchClause, Expression, InfixOperator, Literal, Statement, UnaryOperator},
    span::Span,
    tokenizer::{Token, TokenType},
};

#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseErrorWithContext>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during parsing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl From<ParseErrorWithContext> for ParseErrors {
    fn from(error: ParseErrorWithContext) -> Self {
        ParseErrors(vec![error])
    }
}

impl ParseErrors {
    /// Position of the first error, if it points at a token.
    pub fn span(&self) -> Option<Span> {
        self.0
            .first()
            .and_then(|error| error.token.as_ref())
            .map(|token| token.span)
    }
}

#[derive(Debug)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    context: Vec<&'static str>,
    pub token: Option<Token>,
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(token) = &self.token {
            write!(
                f,
                " at {} but found \"{}\"",
                token.span, token.token_type
            )?;
        }
        write!(f, " (while parsing {})", self.context.join(" > "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected one of {0:?}")]
    ExpectedOneOf(Vec<TokenType>),
    #[error("Unexpected \"{0}\"")]
    Unexpected(TokenType),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("Only variables can be incremented")]
    InvalidIncrementTarget,
}

#[derive(Debug)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    /// Column of the first token on each line, used for indented blocks.
    line_indents: FxHashMap<usize, usize>,
}

impl ParseContext {
    fn new(tokens: &[Token]) -> Self {
        let mut line_indents = FxHashMap::default();
        for token in tokens {
            line_indents
                .entry(token.span.line)
                .or_insert(token.span.column);
        }
        Self {
            stack: RefCell::new(Vec::new()),
            line_indents,
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard<'_> {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn indent_of(&self, line: usize) -> usize {
        self.line_indents.get(&line).copied().unwrap_or(1)
    }

    fn error(&self, error: ParseError, token: Option<&Token>) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context: self.stack.borrow().clone(),
            token: token.cloned(),
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

type StatementResult<'a> = Result<(Statement, &'a [Token]), ParseErrors>;
type ExpressionResult<'a> = Result<(Expression, &'a [Token]), ParseErrorWithContext>;

/// Parses a whole function body.
pub fn function_body(tokens: &[Token]) -> Result<Block, ParseErrors> {
    let context = ParseContext::new(tokens);
    let _guard = context.push("function_body");
    let span = tokens.first().map(|t| t.span).unwrap_or_default();

    let (statements, rest) = statements(&context, tokens, |_| false)?;
    match rest.first() {
        Some(token) if token.token_type() != &TokenType::Eof => Err(context
            .error(ParseError::Unexpected(token.token_type.clone()), Some(token))
            .into()),
        _ => Ok(Block { statements, span }),
    }
}

/// Parses a standalone expression that must span all of `tokens`.
pub fn standalone_expression(tokens: &[Token]) -> Result<Expression, ParseErrors> {
    let context = ParseContext::new(tokens);
    let _guard = context.push("standalone_expression");
    let (expr, rest) = expression(&context, tokens)?;
    match rest.first().map(Token::token_type) {
        None | Some(TokenType::Eof) => Ok(expr),
        Some(_) => Err(context
            .error(ParseError::Expected(TokenType::Eof), rest.first())
            .into()),
    }
}

fn is_clause_keyword(token: &Token) -> bool {
    matches!(
        token.token_type(),
        TokenType::Else | TokenType::Elif | TokenType::Catch | TokenType::Finally
    )
}

/// Whether a clause keyword (`else`, `catch`, ...) belongs to the statement
/// opened by `header`. A clause starting its own line must line up with the header.
fn continues(context: &ParseContext, header: &Token, clause: &Token) -> bool {
    let clause_indent = context.indent_of(clause.span.line);
    clause_indent != clause.span.column || clause_indent == context.indent_of(header.span.line)
}

fn statements<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    stop: impl Fn(&Token) -> bool,
) -> Result<(Vec<Statement>, &'a [Token]), ParseErrors> {
    let mut statements = Vec::new();
    let mut tokens = tokens;
    let mut errors = Vec::new();

    while let Some(token) = tokens.first() {
        if matches!(token.token_type(), TokenType::Eof | TokenType::RightBrace)
            || is_clause_keyword(token)
            || stop(token)
        {
            break;
        }

        match statement(context, tokens) {
            Ok((stmt, rest)) => {
                statements.push(stmt);
                tokens = rest;
            }
            Err(mut err) => {
                errors.append(&mut err.0);
                tokens = consume_rest_of_line(tokens);
            }
        }
    }

    if !errors.is_empty() {
        return Err(ParseErrors(errors));
    }

    Ok((statements, tokens))
}

fn consume_rest_of_line(tokens: &[Token]) -> &[Token] {
    let Some(first) = tokens.first() else {
        return tokens;
    };
    let line = first.span.line;
    let mut tokens = &tokens[1..];
    while let Some(token) = tokens.first() {
        if token.span.line != line || token.token_type() == &TokenType::Eof {
            break;
        }
        tokens = &tokens[1..];
    }
    tokens
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> StatementResult<'a> {
    let _guard = context.push("statement");
    let Some(token) = tokens.first() else {
        return Err(context
            .error(ParseError::Unexpected(TokenType::Eof), None)
            .into());
    };
    let span = token.span;

    let (stmt, rest) = match token.token_type() {
        TokenType::If => return if_statement(context, tokens),
        TokenType::While => return while_statement(context, tokens),
        TokenType::For => return for_statement(context, tokens),
        TokenType::Try => return try_statement(context, tokens),
        TokenType::LeftBrace => {
            let (block, rest) = brace_block(context, &tokens[1..], span)?;
            return Ok((Statement::Block(block), rest));
        }
        TokenType::Break => (Statement::Break(span), &tokens[1..]),
        TokenType::Continue => (Statement::Continue(span), &tokens[1..]),
        TokenType::Return => {
            let (expr, rest) = optional_expression(context, token, &tokens[1..])?;
            (Statement::Return(expr, span), rest)
        }
        TokenType::Throw => {
            let (expr, rest) = optional_expression(context, token, &tokens[1..])?;
            (Statement::Throw(expr, span), rest)
        }
        TokenType::Echo => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            (Statement::Echo(expr, span), rest)
        }
        TokenType::Import => import_statement(context, &tokens[1..], span)?,
        _ => expression_statement(context, tokens)?,
    };

    Ok((stmt, optional_semicolon(rest)))
}

fn optional_semicolon(tokens: &[Token]) -> &[Token] {
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Semicolon) => &tokens[1..],
        _ => tokens,
    }
}

/// An expression that may be omitted, as in `return;` or a bare `return` at end of line.
fn optional_expression<'a>(
    context: &ParseContext,
    keyword: &Token,
    tokens: &'a [Token],
) -> Result<(Option<Expression>, &'a [Token]), ParseErrorWithContext> {
    match tokens.first() {
        Some(token)
            if token.span.line == keyword.span.line
                && !is_clause_keyword(token)
                && !matches!(
                    token.token_type(),
                    TokenType::Semicolon | TokenType::RightBrace | TokenType::Eof
                ) =>
        {
            let (expr, rest) = expression(context, tokens)?;
            Ok((Some(expr), rest))
        }
        _ => Ok((None, tokens)),
    }
}

fn import_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    span: Span,
) -> Result<(Statement, &'a [Token]), ParseErrorWithContext> {
    let _guard = context.push("import_statement");
    let (mut module, mut tokens) = match_identifier(context, tokens)?;
    while let (Some(TokenType::Dot), Some(TokenType::Identifier(part))) = (
        tokens.first().map(Token::token_type),
        tokens.get(1).map(Token::token_type),
    ) {
        module.push('.');
        module.push_str(part);
        tokens = &tokens[2..];
    }

    let alias = match tokens.first().map(Token::token_type) {
        Some(TokenType::Identifier(word)) if word == "as" => {
            let (alias, rest) = match_identifier(context, &tokens[1..])?;
            tokens = rest;
            Some(alias)
        }
        _ => None,
    };

    Ok((
        Statement::Import {
            module,
            alias,
            span,
        },
        tokens,
    ))
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Result<(Statement, &'a [Token]), ParseErrorWithContext> {
    let _guard = context.push("expression_statement");
    let (expr, rest) = expression(context, tokens)?;

    match rest.first().map(Token::token_type) {
        Some(TokenType::Equal) => {
            let (value, rest) = expression(context, &rest[1..])?;
            match expr {
                Expression::Variable(target, span) => Ok((
                    Statement::Assign {
                        target,
                        expr: value,
                        span,
                    },
                    rest,
                )),
                Expression::Index(target, index, span) => match *target {
                    Expression::Variable(target, _) => Ok((
                        Statement::IndexAssign {
                            target,
                            index: *index,
                            expr: value,
                            span,
                        },
                        rest,
                    )),
                    _ => Err(context.error(ParseError::InvalidAssignmentTarget, tokens.first())),
                },
                _ => Err(context.error(ParseError::InvalidAssignmentTarget, tokens.first())),
            }
        }
        _ => match expr {
            Expression::PostfixIncrement(name, span) => Ok((Statement::Increment(name, span), rest)),
            expr => Ok((Statement::Expression(expr), rest)),
        },
    }
}

/// Parses the body that follows a compound statement header.
///
/// The body is a `{ ... }` block, the statements on the same line as the `:`,
/// or the following lines indented deeper than the header line.
fn body<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    header: &Token,
) -> Result<(Block, &'a [Token]), ParseErrors> {
    let _guard = context.push("body");
    let (colon_line, tokens) = match tokens.first() {
        Some(token) if token.token_type() == &TokenType::Colon => (token.span.line, &tokens[1..]),
        Some(token) if token.token_type() == &TokenType::LeftBrace => (token.span.line, tokens),
        token => {
            return Err(context
                .error(ParseError::Expected(TokenType::Colon), token)
                .into())
        }
    };

    let Some(first) = tokens.first() else {
        return Ok((
            Block {
                statements: Vec::new(),
                span: header.span,
            },
            tokens,
        ));
    };
    let span = first.span;

    if first.token_type() == &TokenType::LeftBrace {
        return brace_block(context, &tokens[1..], span);
    }

    let (statements, rest) = if first.span.line == colon_line {
        statements(context, tokens, |token| token.span.line != colon_line)?
    } else {
        let indent = context.indent_of(header.span.line);
        statements(context, tokens, |token| token.span.column <= indent)?
    };

    Ok((Block { statements, span }, rest))
}

fn brace_block<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    span: Span,
) -> Result<(Block, &'a [Token]), ParseErrors> {
    let _guard = context.push("block");
    let (statements, rest) = statements(context, tokens, |_| false)?;
    match rest.first().map(Token::token_type) {
        Some(TokenType::RightBrace) => Ok((Block { statements, span }, &rest[1..])),
        _ => Err(context
            .error(ParseError::Expected(TokenType::RightBrace), rest.first())
            .into()),
    }
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> StatementResult<'a> {
    let _guard = context.push("if_statement");
    let header = &tokens[0];
    let (condition, tokens) = expression(context, &tokens[1..])?;
    let (then_block, tokens) = body(context, tokens, header)?;

    let (else_block, tokens) = match tokens.first() {
        Some(token) if token.token_type() == &TokenType::Elif && continues(context, header, token) => {
            // `elif` desugars to an else block holding a nested if.
            let (nested, rest) = if_statement(context, tokens)?;
            let span = nested.span();
            (
                Some(Block {
                    statements: vec![nested],
                    span,
                }),
                rest,
            )
        }
        Some(token) if token.token_type() == &TokenType::Else && continues(context, header, token) => {
            let (block, rest) = body(context, &tokens[1..], token)?;
            (Some(block), rest)
        }
        _ => (None, tokens),
    };

    Ok((
        Statement::If {
            condition,
            then_block,
            else_block,
            span: header.span,
        },
        tokens,
    ))
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> StatementResult<'a> {
    let _guard = context.push("while_statement");
    let header = &tokens[0];
    let (condition, tokens) = expression(context, &tokens[1..])?;
    let (body, tokens) = body(context, tokens, header)?;
    Ok((
        Statement::While {
            condition,
            body,
            span: header.span,
        },
        tokens,
    ))
}

fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> StatementResult<'a> {
    let _guard = context.push("for_statement");
    let header = &tokens[0];
    let mut tokens = &tokens[1..];

    let parenthesized = tokens.first().map(Token::token_type) == Some(&TokenType::LeftParen);
    if parenthesized {
        tokens = &tokens[1..];
    }
    let (variable, rest) = match_identifier(context, tokens)?;
    let rest = consume(context, rest, TokenType::In)?;
    let (iterable, mut tokens) = expression(context, rest)?;
    if parenthesized {
        tokens = consume(context, tokens, TokenType::RightParen)?;
    }

    let (body, tokens) = body(context, tokens, header)?;
    Ok((
        Statement::ForIn {
            variable,
            iterable,
            body,
            span: header.span,
        },
        tokens,
    ))
}

fn try_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> StatementResult<'a> {
    let _guard = context.push("try_statement");
    let header = &tokens[0];
    let (try_block, mut tokens) = body(context, &tokens[1..], header)?;

    let mut catches = Vec::new();
    while let Some(token) = tokens.first() {
        if token.token_type() != &TokenType::Catch || !continues(context, header, token) {
            break;
        }
        let (clause, rest) = catch_clause(context, tokens)?;
        catches.push(clause);
        tokens = rest;
    }

    let finally_block = match tokens.first() {
        Some(token)
            if token.token_type() == &TokenType::Finally && continues(context, header, token) =>
        {
            let (block, rest) = body(context, &tokens[1..], token)?;
            tokens = rest;
            Some(block)
        }
        _ => None,
    };

    if catches.is_empty() && finally_block.is_none() {
        return Err(context
            .error(
                ParseError::ExpectedOneOf(vec![TokenType::Catch, TokenType::Finally]),
                tokens.first(),
            )
            .into());
    }

    Ok((
        Statement::Try {
            try_block,
            catches,
            finally_block,
            span: header.span,
        },
        tokens,
    ))
}

fn catch_clause<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Result<(CatchClause, &'a [Token]), ParseErrors> {
    let _guard = context.push("catch_clause");
    let header = &tokens[0];
    let mut tokens = &tokens[1..];

    let parenthesized = tokens.first().map(Token::token_type) == Some(&TokenType::LeftParen);
    if parenthesized {
        tokens = &tokens[1..];
    }
    let (first, rest) = match_identifier(context, tokens)?;
    let (error_type, variable, mut tokens) = match rest.first().map(Token::token_type) {
        Some(TokenType::Identifier(variable)) => (Some(first), variable.clone(), &rest[1..]),
        _ => (None, first, rest),
    };
    if parenthesized {
        tokens = consume(context, tokens, TokenType::RightParen)?;
    }

    let (block, tokens) = body(context, tokens, header)?;
    Ok((
        CatchClause {
            error_type,
            variable,
            block,
            span: header.span,
        },
        tokens,
    ))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("expression");
    logical_or(context, tokens)
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ExpressionResult<'a>,
    operator: impl Fn(&Token) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> ExpressionResult<'a> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token) {
            Some(op) => op,
            None => break,
        };
        tokens = &tokens[1..];
        let (right, rest) = precedence(context, tokens)?;
        let span = expr.span();
        expr = Expression::Binary(Box::new(expr), op, Box::new(right), span);
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("logical_or");
    binary(
        context,
        logical_and,
        |token| match token.token_type() {
            TokenType::OrOr => Some(InfixOperator::Or),
            _ => None,
        },
        tokens,
    )
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("logical_and");
    binary(
        context,
        equality,
        |token| match token.token_type() {
            TokenType::AndAnd => Some(InfixOperator::And),
            _ => None,
        },
        tokens,
    )
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token| match token.token_type() {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            _ => None,
        },
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token| match token.token_type() {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token| match token.token_type() {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token| match token.token_type() {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            TokenType::Percent => Some(InfixOperator::Modulo),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("unary");

    let (operator, span) = match tokens.first() {
        Some(token) if token.token_type() == &TokenType::Minus => {
            (UnaryOperator::Negate, token.span)
        }
        Some(token) if token.token_type() == &TokenType::Bang => (UnaryOperator::Not, token.span),
        _ => return postfix(context, tokens),
    };

    let (right, rest) = unary(context, &tokens[1..])?;
    let expr = match (operator, right) {
        (UnaryOperator::Negate, Expression::Literal(Literal::Integer(n), _)) => {
            Expression::Literal(Literal::Integer(-n), span)
        }
        (UnaryOperator::Negate, Expression::Literal(Literal::Float(n), _)) => {
            Expression::Literal(Literal::Float(-n), span)
        }
        (operator, right) => Expression::Unary(operator, Box::new(right), span),
    };
    Ok((expr, rest))
}

/// Calls, indexing, member access and `++`.
///
/// Call and index brackets only continue an expression on the same line.
fn postfix<'a>(context: &ParseContext, start: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("postfix");
    let (mut expr, mut tokens) = primary(context, start)?;

    while let Some(token) = tokens.first() {
        let previous_line = start[start.len() - tokens.len() - 1].span.line;
        let same_line = token.span.line == previous_line;
        let span = expr.span();

        match token.token_type() {
            TokenType::LeftParen if same_line => {
                let (args, rest) = arguments(context, &tokens[1..])?;
                tokens = rest;
                expr = match expr {
                    Expression::Variable(name, span) => match name.rsplit_once('.') {
                        Some((object, method)) => Expression::MethodCall {
                            object: Box::new(Expression::Variable(object.to_string(), span)),
                            method: method.to_string(),
                            args,
                            span,
                        },
                        None => Expression::FunctionCall(name, args, span),
                    },
                    _ => {
                        return Err(context.error(
                            ParseError::Unexpected(TokenType::LeftParen),
                            Some(token),
                        ))
                    }
                };
            }
            TokenType::LeftBracket if same_line => {
                let (index, rest) = expression(context, &tokens[1..])?;
                tokens = consume(context, rest, TokenType::RightBracket)?;
                expr = Expression::Index(Box::new(expr), Box::new(index), span);
            }
            TokenType::Dot => {
                let (name, rest) = match_identifier(context, &tokens[1..])?;
                tokens = rest;
                expr = match expr {
                    Expression::Variable(path, span) => {
                        Expression::Variable(format!("{path}.{name}"), span)
                    }
                    object => {
                        let (args, rest) = match tokens.first().map(Token::token_type) {
                            Some(TokenType::LeftParen) => arguments(context, &tokens[1..])?,
                            _ => (Vec::new(), tokens),
                        };
                        tokens = rest;
                        Expression::MethodCall {
                            object: Box::new(object),
                            method: name,
                            args,
                            span,
                        }
                    }
                };
            }
            TokenType::PlusPlus => {
                expr = match expr {
                    Expression::Variable(name, span) => Expression::PostfixIncrement(name, span),
                    _ => return Err(context.error(ParseError::InvalidIncrementTarget, Some(token))),
                };
                tokens = &tokens[1..];
            }
            _ => break,
        }
    }

    Ok((expr, tokens))
}

/// Comma separated expressions up to and including `closing`.
fn delimited<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    closing: TokenType,
) -> Result<(Vec<Expression>, &'a [Token]), ParseErrorWithContext> {
    let mut items = Vec::new();
    let mut tokens = tokens;
    loop {
        if tokens.first().map(Token::token_type) == Some(&closing) {
            return Ok((items, &tokens[1..]));
        }
        let (item, rest) = expression(context, tokens)?;
        items.push(item);
        tokens = rest;
        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(t) if t == &closing => return Ok((items, &tokens[1..])),
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, closing]),
                    tokens.first(),
                ))
            }
        }
    }
}

fn arguments<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Result<(Vec<Expression>, &'a [Token]), ParseErrorWithContext> {
    let _guard = context.push("arguments");
    delimited(context, tokens, TokenType::RightParen)
}

fn dictionary<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    span: Span,
) -> ExpressionResult<'a> {
    let _guard = context.push("dictionary");
    let mut pairs = Vec::new();
    let mut tokens = tokens;
    loop {
        if tokens.first().map(Token::token_type) == Some(&TokenType::RightBrace) {
            return Ok((Expression::Dict(pairs, span), &tokens[1..]));
        }

        // Bare identifiers are string keys.
        let (key, rest) = match tokens.first() {
            Some(Token {
                token_type: TokenType::Identifier(name),
                span,
                ..
            }) if tokens.get(1).map(Token::token_type) == Some(&TokenType::Colon) => (
                Expression::Literal(Literal::String(name.clone()), *span),
                &tokens[1..],
            ),
            _ => expression(context, tokens)?,
        };
        let rest = consume(context, rest, TokenType::Colon)?;
        let (value, rest) = expression(context, rest)?;
        pairs.push((key, value));
        tokens = rest;

        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightBrace) => {
                return Ok((Expression::Dict(pairs, span), &tokens[1..]))
            }
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightBrace]),
                    tokens.first(),
                ))
            }
        }
    }
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ExpressionResult<'a> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::Unexpected(TokenType::Eof), None));
    };
    let span = token.span;
    let literal = |literal: Literal| -> ExpressionResult<'a> {
        Ok((Expression::Literal(literal, span), &tokens[1..]))
    };

    match token.token_type() {
        TokenType::Integer(n) => literal(Literal::Integer(*n)),
        TokenType::Float(n) => literal(Literal::Float(*n)),
        TokenType::String(s) => literal(Literal::String(s.clone())),
        TokenType::True => literal(Literal::Boolean(true)),
        TokenType::False => literal(Literal::Boolean(false)),
        TokenType::Null => literal(Literal::Null),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenType::RightParen)?;
            Ok((expr, tokens))
        }
        TokenType::LeftBracket => {
            let (items, rest) = delimited(context, &tokens[1..], TokenType::RightBracket)?;
            Ok((Expression::Array(items, span), rest))
        }
        TokenType::LeftBrace => dictionary(context, &tokens[1..], span),
        TokenType::Identifier(name) => Ok((Expression::Variable(name.clone(), span), &tokens[1..])),
        token_type => Err(context.error(ParseError::Unexpected(token_type.clone()), Some(token))),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
) -> Result<&'a [Token], ParseErrorWithContext> {
    match tokens.first().map(Token::token_type) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseError::Expected(token_type), tokens.first())),
    }
}

fn match_identifier<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Result<(String, &'a [Token]), ParseErrorWithContext> {
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Identifier(name)) => Ok((name.clone(), &tokens[1..])),
        _ => Err(context.error(ParseError::ExpectedIdentifier, tokens.first())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Block {
        function_body(&tokens(source).unwrap()).unwrap()
    }

    #[test]
    fn test_precedence() {
        let block = parse("x = 1 + 2 * 3 == 7 && !false || y;");
        let Statement::Assign { target, expr, .. } = &block.statements[0] else {
            panic!("expected assignment");
        };
        assert_eq!(target, "x");
        assert_eq!(expr.to_string(), "((((1 + (2 * 3)) == 7) && !false) || y)");
    }

    #[test]
    fn test_dotted_calls_and_properties() {
        let block = parse("this.parent.init(a, 2)\nx = this.items[0]");
        let Statement::Expression(Expression::MethodCall { object, method, args, .. }) =
            &block.statements[0]
        else {
            panic!("expected method call");
        };
        assert_eq!(object.to_string(), "this.parent");
        assert_eq!(method, "init");
        assert_eq!(args.len(), 2);
        assert!(matches!(
            &block.statements[1],
            Statement::Assign { expr: Expression::Index(..), .. }
        ));
    }

    #[test]
    fn test_same_line_bodies() {
        let block = parse("for (i in [1, 2, 3]): if (i == 2): break;\nreturn i;");
        assert_eq!(block.statements.len(), 2);
        let Statement::ForIn { variable, body, .. } = &block.statements[0] else {
            panic!("expected for");
        };
        assert_eq!(variable, "i");
        let Statement::If { then_block, .. } = &body.statements[0] else {
            panic!("expected if");
        };
        assert!(matches!(then_block.statements[0], Statement::Break(_)));
        assert!(matches!(block.statements[1], Statement::Return(Some(_), _)));
    }

    #[test]
    fn test_indented_bodies_and_elif() {
        let source = "\
if (x > 1):
    y = 1
elif (x > 0):
    y = 2
else:
    y = 3
    z = 4
echo y";
        let block = parse(source);
        assert_eq!(block.statements.len(), 2);
        let Statement::If { else_block, .. } = &block.statements[0] else {
            panic!("expected if");
        };
        let nested = &else_block.as_ref().unwrap().statements[0];
        let Statement::If { else_block, .. } = nested else {
            panic!("elif should desugar to nested if");
        };
        assert_eq!(else_block.as_ref().unwrap().statements.len(), 2);
    }

    #[test]
    fn test_else_binds_to_aligned_if() {
        let source = "\
if (a):
    if (b):
        x = 1
else:
    x = 2";
        let block = parse(source);
        let Statement::If { then_block, else_block, .. } = &block.statements[0] else {
            panic!("expected if");
        };
        assert!(else_block.is_some());
        let Statement::If { else_block: inner_else, .. } = &then_block.statements[0] else {
            panic!("expected nested if");
        };
        assert!(inner_else.is_none());
    }

    #[test]
    fn test_try_with_typed_catches() {
        let source = "\
try:
    x = 1 / 0
catch (DivisionError e):
    echo e
catch (err):
    echo err
finally:
    echo \"done\"";
        let block = parse(source);
        let Statement::Try { catches, finally_block, .. } = &block.statements[0] else {
            panic!("expected try");
        };
        assert_eq!(catches[0].error_type.as_deref(), Some("DivisionError"));
        assert_eq!(catches[0].variable, "e");
        assert_eq!(catches[1].error_type, None);
        assert!(finally_block.is_some());
    }

    #[test]
    fn test_brace_blocks_and_dicts() {
        let block = parse("while (i < 3) { i++; }\nd = {name: \"a\", 1: [1, 2]}\nd[\"k\"] = 2");
        assert!(matches!(block.statements[0], Statement::While { .. }));
        let Statement::While { body, .. } = &block.statements[0] else {
            unreachable!()
        };
        assert!(matches!(body.statements[0], Statement::Increment(..)));
        assert!(matches!(
            &block.statements[1],
            Statement::Assign { expr: Expression::Dict(pairs, _), .. } if pairs.len() == 2
        ));
        assert!(matches!(
            &block.statements[2],
            Statement::IndexAssign { target, .. } if target == "d"
        ));
    }

    #[test]
    fn test_import_with_alias() {
        let block = parse("import math as m");
        assert!(matches!(
            &block.statements[0],
            Statement::Import { module, alias: Some(alias), .. } if module == "math" && alias == "m"
        ));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = function_body(&tokens("1 + 2 = 3").unwrap()).unwrap_err();
        assert!(matches!(err.0[0].error, ParseError::InvalidAssignmentTarget));
    }

    #[test]
    fn test_unclosed_block() {
        let err = function_body(&tokens("if (x) { y = 1").unwrap()).unwrap_err();
        assert!(err
            .0
            .iter()
            .any(|e| matches!(e.error, ParseError::Expected(TokenType::RightBrace))));
    }
}
