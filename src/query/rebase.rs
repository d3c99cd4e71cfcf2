use crate::error::FlowError;
use crate::expression::Lambda;

/// Re-roots a filter written for a related entity
///
/// `s => s.id > 2` rebased onto `u => u.setting` becomes `u => u.setting.id > 2`.
///
/// # Errors
///
/// `ArgumentShape` when either lambda does not take exactly one parameter or
/// the navigation does not produce the filter's parameter type.
pub fn rebase_filter(filter: &Lambda, navigation: &Lambda) -> Result<Lambda, FlowError> {
    let target = filter.single_param()?;
    let source = navigation.single_param()?;
    let produced = navigation.body().data_type();

    if !produced.compatible_with(&target.ty) {
        return Err(FlowError::argument_shape(format!(
            "navigation produces {produced:?}, the filter expects {:?}",
            target.ty
        )));
    }

    let body = filter.body().substitute(&target.name, navigation.body());
    Ok(Lambda::new(vec![source.clone()], body))
}
