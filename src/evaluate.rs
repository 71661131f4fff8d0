use crate::{Actor, Groups, RuleSet};

/// Whether any group of `rules` grants visibility to `actor`.
///
/// Groups with no registered predicate contribute `false`, so stored rules
/// may outlive the groups they mention. A panicking predicate unwinds
/// through the caller.
#[must_use]
pub fn enabled_for_actor(rules: &RuleSet, actor: &Actor, groups: &Groups) -> bool {
    rules.iter().any(|(group, values)| {
        groups
            .get(group)
            .is_some_and(|predicate| predicate(actor, values))
    })
}
