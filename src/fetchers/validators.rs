use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;
use log::warn;
use regex::Regex;

use crate::http::{Response, Validator};

/// Validator that fails any otherwise-successful response whose body matches
/// the pattern. Useful for soft error pages served with a 200.
pub fn reject_body_matching(pattern: Regex) -> Validator {
    Arc::new(move |mut response: Response| {
        let pattern = pattern.clone();
        async move {
            let matched = pattern.is_match(response.text());
            if response.ok && matched {
                warn!(
                    "Validator rejected {}: body matched {:?}",
                    response.url,
                    pattern.as_str()
                );
                response.set_ok(false);
            }
            response
        }
        .boxed()
    })
}

/// Validator that accepts only the listed statuses.
pub fn require_status(accepted: &[u16]) -> Validator {
    let accepted: HashSet<u16> = accepted.iter().copied().collect();
    Arc::new(move |mut response: Response| {
        let accepted = accepted.clone();
        async move {
            let ok = matches!(response.status, Some(status) if accepted.contains(&status));
            response.set_ok(ok);
            response
        }
        .boxed()
    })
}
