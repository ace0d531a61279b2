use log::info;

use crate::error::{FeedbackError, Result};
use crate::ingest::IngestOutcome;
use crate::model::{GroupKey, GroupMap, GroupRecord};

/// Merges fragments sharing a group key. `None` fragments (files that failed to
/// ingest) are skipped, and groups that end up with no comments and no non-zero
/// counts are dropped.
pub fn aggregate<I>(fragments: I) -> GroupMap<GroupRecord>
where
    I: IntoIterator<Item = (GroupKey, Option<GroupRecord>)>,
{
    let mut groups: GroupMap<GroupRecord> = GroupMap::new();
    for (key, fragment) in fragments {
        if let Some(fragment) = fragment {
            groups.entry(key).or_default().merge(fragment);
        }
    }
    groups.retain(|_, record| !record.is_empty());
    info!("aggregated {} group(s)", groups.len());
    groups
}

/// Convenience over [`aggregate`] for ingestion results.
pub fn aggregate_outcomes(outcomes: &[IngestOutcome]) -> GroupMap<GroupRecord> {
    aggregate(
        outcomes
            .iter()
            .map(|o| (o.group.clone(), o.fragment.clone())),
    )
}

/// Fails with `NoUsableData` when aggregation produced nothing to analyse.
pub fn ensure_usable(groups: &GroupMap<GroupRecord>) -> Result<()> {
    if groups.is_empty() {
        return Err(FeedbackError::NoUsableData);
    }
    Ok(())
}

/// Every comment across all groups, in group order.
pub fn all_comments(groups: &GroupMap<GroupRecord>) -> Vec<String> {
    groups
        .values()
        .flat_map(|r| r.comments.iter().cloned())
        .collect()
}
