/// Builds a [`Lambda`](crate::expression::Lambda) from typed parameters and a body.
///
/// Each parameter is bound as an [`Expr`](crate::expression::Expr) inside the
/// body, so member access, operators and method builders apply directly:
///
/// ```ignore
/// let filter = lambda!(|u: User| u.get("id").eq(2));
/// let select = lambda!(|u: User| Expr::object([("name", u.get("name"))]));
/// let delegated = lambda!(|u: User, w: WhereDelegate| {
///     w.invoke(vec![u.get("id"), Is::between(2, 3).into()])
/// });
/// ```
#[macro_export]
macro_rules! lambda {
    (|$($param:ident : $ty:ty),+ $(,)?| $body:expr) => {{
        $(
            let $param = $crate::expression::Parameter::of::<$ty>(stringify!($param));
        )+
        let params = vec![$($param.clone()),+];
        $(
            #[allow(unused_variables)]
            let $param = $crate::expression::Expr::from($param);
        )+
        $crate::expression::Lambda::new(params, $body)
    }};
}

#[cfg(test)]
mod tests {
    use crate::expression::{BinaryOp, Expr};
    use crate::value::DataType;

    #[test]
    fn test_parameters_are_bound_in_order() {
        let lambda = lambda!(|a: i64, b: String| a.gt(1));
        let names: Vec<_> = lambda.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(lambda.params[1].ty, DataType::String);
        assert!(matches!(
            lambda.body(),
            Expr::Binary { op: BinaryOp::GreaterThan, .. }
        ));
    }
}
