use crate::errors::TreeGrowError;

/// Reduction in regularized training loss from splitting a node into the
/// given left and right aggregates. Equation 7 of the XGBoost paper,
/// written with the gradient sign convention of the leaf weight below.
#[inline]
pub fn split_gain(
    gradient_left: f32,
    hessian_left: f32,
    gradient_right: f32,
    hessian_right: f32,
    sum_gradients: f32,
    sum_hessians: f32,
    l2_regularization: f32,
) -> f32 {
    0.5 * ((gradient_left * gradient_left) / (hessian_left + l2_regularization)
        + (gradient_right * gradient_right) / (hessian_right + l2_regularization)
        - (sum_gradients * sum_gradients) / (sum_hessians + l2_regularization))
}

/// Regularized Newton-step value of a leaf, scaled by shrinkage.
#[inline]
pub fn leaf_weight(sum_gradients: f32, sum_hessians: f32, l2_regularization: f32, shrinkage: f32) -> f32 {
    shrinkage * sum_gradients / (sum_hessians + l2_regularization)
}

// Validation
pub fn validate_not_below<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    parameter: &str,
) -> Result<(), TreeGrowError> {
    if value < min {
        Err(TreeGrowError::InvalidParameter(
            parameter.to_string(),
            format!("a value of at least {}", min),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_positive_float(value: f32, parameter: &str) -> Result<(), TreeGrowError> {
    if !(value > 0.0) || !value.is_finite() {
        Err(TreeGrowError::InvalidParameter(
            parameter.to_string(),
            "a finite value greater than 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_non_negative_float(value: f32, parameter: &str) -> Result<(), TreeGrowError> {
    if !(value >= 0.0) || !value.is_finite() {
        Err(TreeGrowError::InvalidParameter(
            parameter.to_string(),
            "a finite value of at least 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}
