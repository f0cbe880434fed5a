use std::fmt;

/// Name given to the nullary wrapper synthesised for each top-level expression.
pub const ANON_EXPR_NAME: &str = "__anon_expr";

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.items.iter().filter_map(|item| match item {
            Item::Definition(definition) => Some(definition),
            Item::Expression(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Definition(FunctionDefinition),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

impl Prototype {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A named function: its prototype plus an owned expression body.
///
/// Definitions are immutable once handed to the registry; replacing one means
/// registering a new definition under the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub prototype: Prototype,
    pub body: Expr,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Expr) -> Self {
        Self {
            prototype: Prototype::new(name, params),
            body,
        }
    }

    /// Wraps a top-level expression into the anonymous nullary function.
    pub fn anonymous(body: Expr) -> Self {
        Self::new(ANON_EXPR_NAME, Vec::new(), body)
    }

    pub fn name(&self) -> &str {
        &self.prototype.name
    }

    pub fn params(&self) -> &[String] {
        &self.prototype.params
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Short human-readable name of the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number literal",
            Self::Variable(_) => "variable reference",
            Self::Binary { .. } => "binary operation",
            Self::Call { .. } => "function call",
            Self::If { .. } => "conditional",
        }
    }

    /// Collects the names of every function called anywhere in this expression.
    pub fn callees<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Number(_) | Self::Variable(_) => {}
            Self::Binary { left, right, .. } => {
                left.callees(out);
                right.callees(out);
            }
            Self::Call { callee, args } => {
                out.push(callee);
                for arg in args {
                    arg.callees(out);
                }
            }
            Self::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.callees(out);
                then_branch.callees(out);
                if let Some(else_branch) = else_branch {
                    else_branch.callees(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Lt => "<",
            Self::Gt => ">",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
