use crate::model::{Endorsement, EndorsementSet};

/// Canonical form of a tag: trimmed, lowercase.
pub fn normalize(tag: &str) -> Endorsement {
    tag.trim().to_lowercase()
}

/// Normalize a batch of tags, dropping blanks.
pub fn normalize_all<I, S>(tags: I) -> EndorsementSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| normalize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// True iff every required endorsement is offered. Empty `required` always matches.
pub fn matches(offered: &EndorsementSet, required: &EndorsementSet) -> bool {
    required.is_subset(offered)
}

/// Required endorsements the restaurant does not offer, in sorted order.
pub fn missing(offered: &EndorsementSet, required: &EndorsementSet) -> Vec<Endorsement> {
    required.difference(offered).cloned().collect()
}
