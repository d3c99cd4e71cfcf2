//! Expression tree: the typed, inspectable form of a query lambda.

use std::ops;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::criteria::Criteria;
use crate::error::FlowError;
use crate::expression::IsExpression;
use crate::value::{Callable, DataType, Typed, Value};

/// Node kinds, used as handler registry keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Parameter,
    Constant,
    Default,
    MemberAccess,
    Call,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    AndAlso,
    OrElse,
    ExclusiveOr,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Not,
    Negate,
    Convert,
    Conditional,
    Lambda,
    New,
    Invoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    AndAlso,
    OrElse,
    ExclusiveOr,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl BinaryOp {
    pub fn kind(self) -> ExprKind {
        match self {
            BinaryOp::Add => ExprKind::Add,
            BinaryOp::Subtract => ExprKind::Subtract,
            BinaryOp::Multiply => ExprKind::Multiply,
            BinaryOp::Divide => ExprKind::Divide,
            BinaryOp::Modulo => ExprKind::Modulo,
            BinaryOp::AndAlso => ExprKind::AndAlso,
            BinaryOp::OrElse => ExprKind::OrElse,
            BinaryOp::ExclusiveOr => ExprKind::ExclusiveOr,
            BinaryOp::Equal => ExprKind::Equal,
            BinaryOp::NotEqual => ExprKind::NotEqual,
            BinaryOp::GreaterThan => ExprKind::GreaterThan,
            BinaryOp::GreaterThanOrEqual => ExprKind::GreaterThanOrEqual,
            BinaryOp::LessThan => ExprKind::LessThan,
            BinaryOp::LessThanOrEqual => ExprKind::LessThanOrEqual,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse | BinaryOp::ExclusiveOr)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    Convert,
}

/// A lambda parameter or a join alias placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: DataType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Parameter { name: name.into(), ty }
    }

    pub fn of<T: Typed>(name: impl Into<String>) -> Self {
        Parameter::new(name, T::data_type())
    }
}

/// Parameters plus a body
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Parameter>,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new(params: Vec<Parameter>, body: impl Into<Expr>) -> Self {
        Lambda {
            params,
            body: Box::new(body.into()),
        }
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn param(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    /// The only parameter of a one-parameter lambda
    ///
    /// # Errors
    ///
    /// Returns `FlowError::ArgumentShape` when the lambda takes zero or several parameters.
    pub fn single_param(&self) -> Result<&Parameter, FlowError> {
        match self.params.as_slice() {
            [p] => Ok(p),
            other => Err(FlowError::argument_shape(format!(
                "expected a lambda with one parameter, got {}",
                other.len()
            ))),
        }
    }

    /// The first parameter, the root the lambda's property paths are relative to
    pub fn root(&self) -> Result<&Parameter, FlowError> {
        self.params
            .first()
            .ok_or_else(|| {
                FlowError::argument_shape("expected a lambda with at least one parameter")
            })
    }
}

/// Method call; static calls have no target and pass the subject as the first argument
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub target: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    pub ty: DataType,
}

impl MethodCall {
    /// The expression the method operates on
    pub fn subject(&self) -> Option<&Expr> {
        match &self.target {
            Some(target) => Some(target),
            None => self.args.first(),
        }
    }

    /// Arguments besides the subject
    pub fn operands(&self) -> &[Expr] {
        match &self.target {
            Some(_) => &self.args,
            None => self.args.get(1..).unwrap_or(&[]),
        }
    }
}

/// An expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Parameter(Parameter),
    Constant {
        value: Value,
        ty: DataType,
    },
    Default(DataType),
    Member {
        target: Box<Expr>,
        name: String,
        ty: DataType,
    },
    Call(MethodCall),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        ty: DataType,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: DataType,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        ty: DataType,
    },
    Lambda(Lambda),
    /// Object construction, anonymous or DTO
    New {
        members: Vec<(String, Expr)>,
        ty: DataType,
    },
    Invoke {
        target: Box<Expr>,
        args: Vec<Expr>,
        ty: DataType,
    },
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn param<T: Typed>(name: impl Into<String>) -> Expr {
        Expr::Parameter(Parameter::of::<T>(name))
    }

    /// Placeholder for a join alias, used inside lambdas to reach joined entities
    pub fn alias<T: Typed>(name: impl Into<String>) -> Expr {
        Expr::param::<T>(name)
    }

    pub fn constant(value: impl Into<Value>) -> Expr {
        let value = value.into();
        let ty = value.data_type();
        Expr::Constant { value, ty }
    }

    pub fn typed_constant(value: impl Into<Value>, ty: DataType) -> Expr {
        Expr::Constant {
            value: value.into(),
            ty,
        }
    }

    pub fn null(ty: DataType) -> Expr {
        Expr::Constant {
            value: Value::Null,
            ty,
        }
    }

    pub fn default_of<T: Typed>() -> Expr {
        Expr::Default(T::data_type())
    }

    /// Object construction from `(member, value)` pairs
    pub fn object<I, S>(members: I) -> Expr
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::New {
            members: members.into_iter().map(|(n, e)| (n.into(), e)).collect(),
            ty: DataType::Object,
        }
    }

    pub fn condition(
        test: impl Into<Expr>,
        if_true: impl Into<Expr>,
        if_false: impl Into<Expr>,
    ) -> Expr {
        let if_true = if_true.into();
        let if_false = if_false.into();
        let ty = match if_true.data_type() {
            DataType::Unknown => if_false.data_type(),
            ty => ty,
        };
        Expr::Conditional {
            test: Box::new(test.into()),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            ty,
        }
    }

    /// Static method call; the first argument is the subject
    pub fn static_call(method: impl Into<String>, args: Vec<Expr>, ty: DataType) -> Expr {
        Expr::Call(MethodCall {
            method: method.into(),
            target: None,
            args,
            ty,
        })
    }

    /// Instance method call on `self`
    pub fn method(self, method: impl Into<String>, args: Vec<Expr>, ty: DataType) -> Expr {
        Expr::Call(MethodCall {
            method: method.into(),
            target: Some(Box::new(self)),
            args,
            ty,
        })
    }

    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Parameter(_) => ExprKind::Parameter,
            Expr::Constant { .. } => ExprKind::Constant,
            Expr::Default(_) => ExprKind::Default,
            Expr::Member { .. } => ExprKind::MemberAccess,
            Expr::Call(_) => ExprKind::Call,
            Expr::Binary { op, .. } => op.kind(),
            Expr::Unary { op: UnaryOp::Not, .. } => ExprKind::Not,
            Expr::Unary { op: UnaryOp::Negate, .. } => ExprKind::Negate,
            Expr::Unary { op: UnaryOp::Convert, .. } => ExprKind::Convert,
            Expr::Conditional { .. } => ExprKind::Conditional,
            Expr::Lambda(_) => ExprKind::Lambda,
            Expr::New { .. } => ExprKind::New,
            Expr::Invoke { .. } => ExprKind::Invoke,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Constant { ty, .. }
            | Expr::Default(ty)
            | Expr::Member { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Conditional { ty, .. }
            | Expr::New { ty, .. }
            | Expr::Invoke { ty, .. } => ty.clone(),
            Expr::Call(call) => call.ty.clone(),
            Expr::Lambda(lambda) => lambda.body.data_type(),
        }
    }

    /// Member access; the type comes from entity metadata when the target is an entity
    pub fn get(&self, name: impl Into<String>) -> Expr {
        let name = name.into();
        let ty = match self.data_type() {
            DataType::Entity(entity) => entity
                .meta()
                .property(&name)
                .map(|p| p.data_type())
                .unwrap_or(DataType::Unknown),
            DataType::String if name == "length" => DataType::Int,
            _ => DataType::Unknown,
        };
        self.get_as(name, ty)
    }

    /// Member access with an explicit type, for unmapped objects
    pub fn get_as(&self, name: impl Into<String>, ty: DataType) -> Expr {
        Expr::Member {
            target: Box::new(self.clone()),
            name: name.into(),
            ty,
        }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        let right = rhs.into();
        let ty = if op.is_comparison() || op.is_logical() {
            DataType::Bool
        } else if op == BinaryOp::Add
            && (self.data_type().is_string() || right.data_type().is_string())
        {
            DataType::String
        } else {
            self.data_type().promote(&right.data_type())
        };
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
            ty,
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Equal, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::NotEqual, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::GreaterThan, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::GreaterThanOrEqual, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::LessThan, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::LessThanOrEqual, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::AndAlso, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::OrElse, rhs)
    }

    pub fn xor(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::ExclusiveOr, rhs)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
            ty: DataType::Bool,
        }
    }

    pub fn negate(self) -> Expr {
        let ty = self.data_type();
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
            ty,
        }
    }

    pub fn convert(self, ty: DataType) -> Expr {
        Expr::Unary {
            op: UnaryOp::Convert,
            operand: Box::new(self),
            ty,
        }
    }

    pub fn convert_to<T: Typed>(self) -> Expr {
        self.convert(T::data_type())
    }

    pub fn invoke(self, args: Vec<Expr>) -> Expr {
        let ty = match self.data_type() {
            DataType::WhereDelegate => DataType::Bool,
            _ => DataType::Unknown,
        };
        Expr::Invoke {
            target: Box::new(self),
            args,
            ty,
        }
    }

    pub fn contains(self, value: impl Into<Expr>) -> Expr {
        self.method("contains", vec![value.into()], DataType::Bool)
    }

    pub fn starts_with(self, value: impl Into<Expr>) -> Expr {
        self.method("starts_with", vec![value.into()], DataType::Bool)
    }

    pub fn ends_with(self, value: impl Into<Expr>) -> Expr {
        self.method("ends_with", vec![value.into()], DataType::Bool)
    }

    /// Zero-based substring of `length` characters
    pub fn substring(self, start: impl Into<Expr>, length: impl Into<Expr>) -> Expr {
        self.method("substring", vec![start.into(), length.into()], DataType::String)
    }

    /// Zero-based substring up to the end of the string
    pub fn substring_from(self, start: impl Into<Expr>) -> Expr {
        self.method("substring", vec![start.into()], DataType::String)
    }

    pub fn trim(self) -> Expr {
        self.method("trim", vec![], DataType::String)
    }

    pub fn trim_start(self) -> Expr {
        self.method("trim_start", vec![], DataType::String)
    }

    pub fn trim_end(self) -> Expr {
        self.method("trim_end", vec![], DataType::String)
    }

    pub fn round(self, digits: impl Into<Expr>) -> Expr {
        self.method("round", vec![digits.into()], DataType::Decimal)
    }

    pub fn is_in(self, values: impl Into<Expr>) -> Expr {
        self.method("is_in", vec![values.into()], DataType::Bool)
    }

    pub fn is_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        self.method("is_between", vec![low.into(), high.into()], DataType::Bool)
    }

    pub fn is_like(self, pattern: impl Into<Expr>) -> Expr {
        self.method("is_like", vec![pattern.into()], DataType::Bool)
    }

    pub fn is_null(self) -> Expr {
        self.method("is_null", vec![], DataType::Bool)
    }

    pub fn is_not_null(self) -> Expr {
        self.method("is_not_null", vec![], DataType::Bool)
    }

    pub fn is_equal_to(self, value: impl Into<Expr>) -> Expr {
        self.method("is_equal_to", vec![value.into()], DataType::Bool)
    }

    pub fn is_greater_than(self, value: impl Into<Expr>) -> Expr {
        self.method("is_greater_than", vec![value.into()], DataType::Bool)
    }

    pub fn is_greater_than_or_equal_to(self, value: impl Into<Expr>) -> Expr {
        self.method("is_greater_than_or_equal_to", vec![value.into()], DataType::Bool)
    }

    pub fn is_less_than(self, value: impl Into<Expr>) -> Expr {
        self.method("is_less_than", vec![value.into()], DataType::Bool)
    }

    pub fn is_less_than_or_equal_to(self, value: impl Into<Expr>) -> Expr {
        self.method("is_less_than_or_equal_to", vec![value.into()], DataType::Bool)
    }

    /// Applies a one-parameter projection lambda to `self`
    pub fn project(self, projection: Lambda) -> Expr {
        let ty = projection.body.data_type();
        self.method("project", vec![Expr::Lambda(projection)], ty)
    }

    /// Replaces every reference to parameter `name` with `replacement`
    ///
    /// Nested lambdas that rebind `name` are left alone.
    pub fn substitute(&self, name: &str, replacement: &Expr) -> Expr {
        let sub = |e: &Expr| Box::new(e.substitute(name, replacement));
        match self {
            Expr::Parameter(p) if p.name == name => replacement.clone(),
            Expr::Parameter(_) | Expr::Constant { .. } | Expr::Default(_) => self.clone(),
            Expr::Member { target, name: member, ty } => Expr::Member {
                target: sub(target),
                name: member.clone(),
                ty: ty.clone(),
            },
            Expr::Call(call) => Expr::Call(MethodCall {
                method: call.method.clone(),
                target: call.target.as_deref().map(sub),
                args: call.args.iter().map(|a| a.substitute(name, replacement)).collect(),
                ty: call.ty.clone(),
            }),
            Expr::Binary { op, left, right, ty } => Expr::Binary {
                op: *op,
                left: sub(left),
                right: sub(right),
                ty: ty.clone(),
            },
            Expr::Unary { op, operand, ty } => Expr::Unary {
                op: *op,
                operand: sub(operand),
                ty: ty.clone(),
            },
            Expr::Conditional { test, if_true, if_false, ty } => Expr::Conditional {
                test: sub(test),
                if_true: sub(if_true),
                if_false: sub(if_false),
                ty: ty.clone(),
            },
            Expr::Lambda(lambda) => {
                if lambda.params.iter().any(|p| p.name == name) {
                    self.clone()
                } else {
                    Expr::Lambda(Lambda {
                        params: lambda.params.clone(),
                        body: sub(&lambda.body),
                    })
                }
            }
            Expr::New { members, ty } => Expr::New {
                members: members
                    .iter()
                    .map(|(n, e)| (n.clone(), e.substitute(name, replacement)))
                    .collect(),
                ty: ty.clone(),
            },
            Expr::Invoke { target, args, ty } => Expr::Invoke {
                target: sub(target),
                args: args.iter().map(|a| a.substitute(name, replacement)).collect(),
                ty: ty.clone(),
            },
        }
    }

    /// True when any node below references a parameter (lambda parameter or alias)
    pub fn references_parameters(&self) -> bool {
        match self {
            Expr::Parameter(_) => true,
            Expr::Constant { .. } | Expr::Default(_) => false,
            Expr::Member { target, .. } => target.references_parameters(),
            Expr::Call(call) => {
                call.target.as_ref().is_some_and(|t| t.references_parameters())
                    || call.args.iter().any(Expr::references_parameters)
            }
            Expr::Binary { left, right, .. } => {
                left.references_parameters() || right.references_parameters()
            }
            Expr::Unary { operand, .. } => operand.references_parameters(),
            Expr::Conditional { test, if_true, if_false, .. } => {
                test.references_parameters()
                    || if_true.references_parameters()
                    || if_false.references_parameters()
            }
            Expr::Lambda(lambda) => lambda.body.references_parameters(),
            Expr::New { members, .. } => members.iter().any(|(_, e)| e.references_parameters()),
            Expr::Invoke { target, args, .. } => {
                target.references_parameters() || args.iter().any(Expr::references_parameters)
            }
        }
    }
}

impl<R: Into<Expr>> ops::Add<R> for Expr {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl<R: Into<Expr>> ops::Sub<R> for Expr {
    type Output = Expr;
    fn sub(self, rhs: R) -> Expr {
        self.binary(BinaryOp::Subtract, rhs)
    }
}

impl<R: Into<Expr>> ops::Mul<R> for Expr {
    type Output = Expr;
    fn mul(self, rhs: R) -> Expr {
        self.binary(BinaryOp::Multiply, rhs)
    }
}

impl<R: Into<Expr>> ops::Div<R> for Expr {
    type Output = Expr;
    fn div(self, rhs: R) -> Expr {
        self.binary(BinaryOp::Divide, rhs)
    }
}

impl<R: Into<Expr>> ops::Rem<R> for Expr {
    type Output = Expr;
    fn rem(self, rhs: R) -> Expr {
        self.binary(BinaryOp::Modulo, rhs)
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.negate()
    }
}

impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::not(self)
    }
}

macro_rules! impl_expr_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::constant(v)
                }
            }
        )*
    };
}

impl_expr_from_value!(
    bool,
    i32,
    i64,
    f64,
    Decimal,
    String,
    &str,
    NaiveDate,
    NaiveDateTime,
    Uuid,
    Value,
    Criteria,
    IsExpression,
    Callable,
);

impl<T: Into<Value>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::constant(Value::from(v))
    }
}

impl From<Parameter> for Expr {
    fn from(p: Parameter) -> Self {
        Expr::Parameter(p)
    }
}

impl From<Lambda> for Expr {
    fn from(l: Lambda) -> Self {
        Expr::Lambda(l)
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_typing() {
        let a = Expr::param::<i32>("a");
        assert_eq!((a.clone() + 1i64).data_type(), DataType::Long);
        assert_eq!(a.clone().gt(2).data_type(), DataType::Bool);
        let s = Expr::param::<String>("s");
        assert_eq!((s + " x").data_type(), DataType::String);
    }

    #[test]
    fn test_static_call_subject_and_operands() {
        let call = Expr::static_call(
            "between",
            vec![Expr::param::<i32>("x"), Expr::constant(1), Expr::constant(2)],
            DataType::Bool,
        );
        let Expr::Call(call) = call else { panic!("expected a call") };
        assert!(matches!(call.subject(), Some(Expr::Parameter(_))));
        assert_eq!(call.operands().len(), 2);
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        let x = Expr::param::<String>("x");
        let inner = Lambda::new(vec![Parameter::of::<String>("x")], x.clone());
        let body = Expr::object([("a", x.clone()), ("b", Expr::Lambda(inner.clone()))]);
        let replaced = body.substitute("x", &Expr::constant("v"));
        let Expr::New { members, .. } = replaced else { panic!("expected new") };
        assert_eq!(members[0].1, Expr::constant("v"));
        assert_eq!(members[1].1, Expr::Lambda(inner));
    }

    #[test]
    fn test_references_parameters() {
        assert!(!Expr::constant(1).references_parameters());
        assert!((Expr::constant(1) + Expr::param::<i32>("p")).references_parameters());
    }

    #[test]
    fn test_single_param_shape() {
        let lambda = Lambda::new(vec![], Expr::constant(true));
        assert!(matches!(lambda.single_param(), Err(FlowError::ArgumentShape(_))));
    }
}
