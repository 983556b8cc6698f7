//! Settle-all batch execution.

use std::future::Future;

/// Run every future to completion and split the outcomes. One failure never prevents
/// the others from completing; results keep the input order.
pub async fn settle_all<I, F, T, E>(futures: I) -> (Vec<T>, Vec<E>)
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let outcomes = futures::future::join_all(futures).await;

    let mut values = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => errors.push(error),
        }
    }
    (values, errors)
}
