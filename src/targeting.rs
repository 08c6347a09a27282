use std::borrow::Cow;

use crate::{
    flag_config::{TargetCriterion, TargetingConfig},
    Context,
};

/// Pick the targeting config that applies to `context`.
///
/// Candidates are checked in ascending `target_priority` order (ties keep their input order). The
/// first candidate whose criteria all match wins. Candidates without criteria never match. When
/// nothing matches, the default (disabled) targeting config is returned.
pub fn resolve<'a>(context: &Context, candidates: &'a [TargetingConfig]) -> Cow<'a, TargetingConfig> {
    let mut sorted = candidates.iter().collect::<Vec<_>>();
    // sort_by_key is stable.
    sorted.sort_by_key(|candidate| candidate.target_priority);

    match sorted.into_iter().find(|candidate| candidate.matches(context)) {
        Some(candidate) => Cow::Borrowed(candidate),
        None => Cow::Owned(TargetingConfig::default()),
    }
}

impl TargetingConfig {
    /// Return `true` if every criterion matches `context`. A config with no criteria does not
    /// match.
    pub fn matches(&self, context: &Context) -> bool {
        match self.target_criteria.as_deref() {
            None | Some([]) => false,
            Some(criteria) => criteria.iter().all(|criterion| criterion.matches(context)),
        }
    }
}

impl TargetCriterion {
    /// Return `true` if the context has a non-empty value for the field and any of the accepted
    /// values is present in it.
    pub fn matches(&self, context: &Context) -> bool {
        let Some(value) = context.attribute(&self.target_field_name) else {
            return false;
        };
        self.target_field_values
            .iter()
            .any(|accepted| value.contains(accepted))
    }
}
