use std::fmt::Display;

use crate::span::Span;

/// A parsed function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

/// A function literal: ordered parameter names and a body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    /// `name = expr` or `a.b.c = expr`.
    Assign {
        target: String,
        expr: Expression,
        span: Span,
    },
    /// `name[index] = expr`, where `name` may be a dotted property path.
    IndexAssign {
        target: String,
        index: Expression,
        expr: Expression,
        span: Span,
    },
    Return(Option<Expression>, Span),
    If {
        condition: Expression,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    ForIn {
        variable: String,
        iterable: Expression,
        body: Block,
        span: Span,
    },
    While {
        condition: Expression,
        body: Block,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Throw(Option<Expression>, Span),
    Try {
        try_block: Block,
        catches: Vec<CatchClause>,
        finally_block: Option<Block>,
        span: Span,
    },
    Echo(Expression, Span),
    Import {
        module: String,
        alias: Option<String>,
        span: Span,
    },
    Increment(String, Span),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// `None` catches everything.
    pub error_type: Option<String>,
    pub variable: String,
    pub block: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal, Span),
    /// A plain name or a dotted property path such as `this.name`.
    Variable(String, Span),
    Binary(Box<Expression>, InfixOperator, Box<Expression>, Span),
    Unary(UnaryOperator, Box<Expression>, Span),
    FunctionCall(String, Vec<Expression>, Span),
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        span: Span,
    },
    PostfixIncrement(String, Span),
    Array(Vec<Expression>, Span),
    Index(Box<Expression>, Box<Expression>, Span),
    Dict(Vec<(Expression, Expression)>, Span),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(_, span)
            | Expression::Variable(_, span)
            | Expression::Binary(_, _, _, span)
            | Expression::Unary(_, _, span)
            | Expression::FunctionCall(_, _, span)
            | Expression::MethodCall { span, .. }
            | Expression::PostfixIncrement(_, span)
            | Expression::Array(_, span)
            | Expression::Index(_, _, span)
            | Expression::Dict(_, span) => *span,
        }
    }
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Expression(expr) => expr.span(),
            Statement::Block(block) => block.span,
            Statement::Assign { span, .. }
            | Statement::IndexAssign { span, .. }
            | Statement::If { span, .. }
            | Statement::ForIn { span, .. }
            | Statement::While { span, .. }
            | Statement::Try { span, .. }
            | Statement::Import { span, .. } => *span,
            Statement::Return(_, span)
            | Statement::Break(span)
            | Statement::Continue(span)
            | Statement::Throw(_, span)
            | Statement::Echo(_, span)
            | Statement::Increment(_, span) => *span,
        }
    }
}

fn write_list<T: Display>(f: &mut std::fmt::Formatter<'_>, items: &[T]) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        write!(f, "{item}")?;
        if i != items.len() - 1 {
            write!(f, ", ")?;
        }
    }
    Ok(())
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(literal, _) => write!(f, "{}", literal),
            Expression::Variable(name, _) => write!(f, "{}", name),
            Expression::Binary(left, op, right, _) => write!(f, "({} {} {})", left, op, right),
            Expression::Unary(op, right, _) => write!(f, "{}{}", op, right),
            Expression::FunctionCall(name, args, _) => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expression::MethodCall {
                object,
                method,
                args,
                ..
            } => {
                write!(f, "{object}.{method}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expression::PostfixIncrement(name, _) => write!(f, "{name}++"),
            Expression::Array(items, _) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expression::Index(target, index, _) => write!(f, "{target}[{index}]"),
            Expression::Dict(pairs, _) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    write!(f, "{key}: {value}")?;
                    if i != pairs.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
            InfixOperator::Modulo => write!(f, "%"),
            InfixOperator::And => write!(f, "&&"),
            InfixOperator::Or => write!(f, "||"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}
