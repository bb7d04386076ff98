//! Helpers for per-item results inside a [`ClassifyResponse`].
//!
//! An output counts as failed only when it carries an error with a non-empty
//! message. An error with an empty message is treated as a success.

use athena_tonic_core::{
    Error, Result,
    proto::{ClassificationError, ClassificationOutput, ClassifyResponse, ErrorCode},
};
use std::collections::BTreeMap;

fn output_error(output: &ClassificationOutput) -> Option<&ClassificationError> {
    output
        .error
        .as_ref()
        .filter(|error| !error.message.is_empty())
}

/// Display name of a wire error code, or the raw number if unknown.
pub fn error_code_name(code: i32) -> String {
    ErrorCode::try_from(code).map_or_else(|_| code.to_string(), |c| c.as_str_name().to_string())
}

pub fn has_output_errors(response: &ClassifyResponse) -> bool {
    response.outputs.iter().any(|o| output_error(o).is_some())
}

/// Outputs without an error, in response order.
pub fn successful_outputs(response: &ClassifyResponse) -> Vec<&ClassificationOutput> {
    response
        .outputs
        .iter()
        .filter(|o| output_error(o).is_none())
        .collect()
}

/// Number of failed outputs per error code name.
pub fn output_error_summary(response: &ClassifyResponse) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for error in response.outputs.iter().filter_map(output_error) {
        *summary.entry(error_code_name(error.code)).or_default() += 1;
    }
    summary
}

/// Logs every failed output at `error`, with non-empty details at `debug`.
pub fn log_output_errors(response: &ClassifyResponse) {
    for output in &response.outputs {
        let Some(error) = output_error(output) else {
            continue;
        };
        tracing::error!(
            correlation_id = %output.correlation_id,
            code = %error_code_name(error.code),
            "Classification output {} failed: {}",
            output.correlation_id,
            error.message
        );
        if !error.details.is_empty() {
            tracing::debug!(
                correlation_id = %output.correlation_id,
                "Error details: {}",
                error.details
            );
        }
    }
}

/// Splits a response into its successful outputs.
///
/// # Errors
///
/// With `raise_on_error`, returns the first failed output as
/// [`Error::Output`].
pub fn process_outputs(
    response: &ClassifyResponse,
    raise_on_error: bool,
    log_errors: bool,
) -> Result<Vec<&ClassificationOutput>> {
    if log_errors {
        log_output_errors(response);
    }

    if raise_on_error {
        let failed = response
            .outputs
            .iter()
            .find_map(|o| output_error(o).map(|e| (o, e)));
        if let Some((output, error)) = failed {
            return Err(Error::Output {
                correlation_id: output.correlation_id.clone(),
                code: error.code,
                message: error.message.clone(),
                details: error.details.clone(),
            });
        }
    }

    Ok(successful_outputs(response))
}
