//! Behavior every store must share, driven through the `Flags` facade.
//!
//! Each backend test file calls `backend_suite!` with a constructor
//! `fn(&str) -> Option<Flags>`; the argument is a name unique to the test
//! (usable as a table or key suffix) and `None` skips the test.

use std::collections::BTreeMap;
use std::thread;

use flipside::{
    Actor, Breakdown, Error, Feature, Flags, RuleSet, Scope, ValidationError, Value, ValueSet,
};

macro_rules! backend_suite {
    (@tests $make:expr; $($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let Some(flags) = ($make)(stringify!($name)) else {
                    eprintln!("skipping {}: backend not configured", stringify!($name));
                    return;
                };
                suite::$name(&flags);
            }
        )*
    };
    ($make:expr) => {
        backend_suite!(@tests $make;
            add_is_idempotent,
            remove_only_touches_one_feature,
            names_are_normalized,
            enable_merges_and_sorts,
            enable_rejects_unknown_group,
            concurrent_enables_converge,
            disable_removes_group,
            disable_retains_emptied_group,
            disable_missing_group_is_noop,
            concurrent_disables_converge,
            rename_moves_rules,
            rename_clobbers_target,
            rename_missing_feature_is_noop,
            store_rename_onto_itself_keeps_rules,
            enabled_checks_predicates,
            enabled_uses_rule_values,
            mixed_value_types,
            exists_checks_feature_and_group,
            features_filter_by_group,
            breakdown_lists_rules,
            breakdown_for_matches_enabled,
            load_replaces_listed_features,
            clear_by_scope,
        );
    };
}

fn staff() -> Actor {
    Actor::new().set("id", 1).set("staff", true)
}

fn register_open(flags: &Flags, groups: &[&str]) {
    for group in groups {
        flags.register(*group, |_, _| true);
    }
}

pub fn add_is_idempotent(flags: &Flags) {
    for _ in 0..3 {
        flags.add("search").unwrap();
    }
    assert_eq!(flags.features(None).unwrap(), vec!["search"]);

    flags.remove("missing").unwrap();
    flags.remove("missing").unwrap();
    assert_eq!(flags.features(None).unwrap(), vec!["search"]);
}

pub fn remove_only_touches_one_feature(flags: &Flags) {
    register_open(flags, &["staff"]);
    flags.enable("search", "staff", ValueSet::new()).unwrap();
    flags.enable("delete", "staff", ValueSet::new()).unwrap();

    flags.remove("search").unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["delete"]);
    assert_eq!(flags.rules("search").unwrap(), None);
}

pub fn names_are_normalized(flags: &Flags) {
    flags.add("Search").unwrap();
    flags.add(" search ").unwrap();
    flags.add("\nSEARCH\t").unwrap();
    assert_eq!(flags.features(None).unwrap(), vec!["search"]);
    assert!(flags.exists("SEARCH", None).unwrap());
}

pub fn enable_merges_and_sorts(flags: &Flags) {
    register_open(flags, &["users", "staff"]);

    flags.enable("search", "users", [1, 2]).unwrap();
    flags.enable("search", "users", [3]).unwrap();
    flags.enable("search", "users", [1]).unwrap();
    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new().with("users", [1, 2, 3])));

    flags.enable("delete", "staff", [3, 1]).unwrap();
    flags.enable("delete", "staff", [4, 2]).unwrap();
    assert_eq!(flags.rules("delete").unwrap(), Some(RuleSet::new().with("staff", [1, 2, 3, 4])));
}

pub fn enable_rejects_unknown_group(flags: &Flags) {
    let err = flags.enable("search", "not-a-group", ValueSet::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnknownGroup { .. })
    ));
    assert!(!flags.exists("search", Some("not-a-group")).unwrap());
    assert!(flags.features(None).unwrap().is_empty());
}

pub fn concurrent_enables_converge(flags: &Flags) {
    register_open(flags, &["users"]);
    thread::scope(|scope| {
        for k in [1, 3, 5] {
            scope.spawn(move || flags.enable("search", "users", [k, k + 1]).unwrap());
        }
    });
    assert_eq!(
        flags.rules("search").unwrap(),
        Some(RuleSet::new().with("users", [1, 2, 3, 4, 5, 6]))
    );
}

pub fn disable_removes_group(flags: &Flags) {
    register_open(flags, &["staff", "users"]);
    flags.enable("search", "staff", ValueSet::new()).unwrap();
    flags.enable("search", "users", ValueSet::new()).unwrap();

    flags.disable("search", "users", ValueSet::new()).unwrap();
    flags.disable("SEARCH", "users", ValueSet::new()).unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["search"]);
    assert_eq!(flags.features(Some("staff")).unwrap(), vec!["search"]);
    assert!(flags.features(Some("users")).unwrap().is_empty());

    flags.disable("search", "staff", ValueSet::new()).unwrap();
    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new()));
}

pub fn disable_retains_emptied_group(flags: &Flags) {
    register_open(flags, &["users", "members"]);
    flags.enable("search", "users", [1, 2]).unwrap();
    flags.disable("search", "users", [2]).unwrap();
    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new().with("users", [1])));

    flags.enable("search", "members", [1]).unwrap();
    flags.disable("search", "members", [1]).unwrap();
    assert_eq!(
        flags.rules("search").unwrap(),
        Some(RuleSet::new().with("members", ValueSet::new()).with("users", [1]))
    );
}

pub fn disable_missing_group_is_noop(flags: &Flags) {
    register_open(flags, &["users"]);
    flags.enable("search", "users", [1]).unwrap();

    flags.disable("search", "staff", [1]).unwrap();
    flags.disable("missing", "users", [1]).unwrap();

    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new().with("users", [1])));
    assert!(!flags.exists("missing", None).unwrap());
}

pub fn concurrent_disables_converge(flags: &Flags) {
    register_open(flags, &["users"]);
    flags.enable("search", "users", [1, 2, 3, 4, 5]).unwrap();
    thread::scope(|scope| {
        for k in [1, 3, 5] {
            scope.spawn(move || flags.disable("search", "users", [k]).unwrap());
        }
    });
    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new().with("users", [2, 4])));
}

pub fn rename_moves_rules(flags: &Flags) {
    register_open(flags, &["members"]);
    flags.enable("search", "members", [1]).unwrap();

    flags.rename(" SEARCH ", " SUPER-SEARCH ").unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["super-search"]);
    assert_eq!(
        flags.rules("super-search").unwrap(),
        Some(RuleSet::new().with("members", [1]))
    );
}

pub fn rename_clobbers_target(flags: &Flags) {
    register_open(flags, &["members", "staff"]);
    flags.enable("search", "members", [1]).unwrap();
    flags.enable("super-search", "members", [2]).unwrap();
    flags.enable("super-search", "staff", ValueSet::new()).unwrap();

    flags.rename("search", "super-search").unwrap();

    let mut expected = Breakdown::new();
    expected.insert("super-search".into(), RuleSet::new().with("members", [1]));
    assert_eq!(flags.breakdown().unwrap(), expected);
}

pub fn rename_missing_feature_is_noop(flags: &Flags) {
    register_open(flags, &["members"]);
    flags.enable("b", "members", [2]).unwrap();

    flags.rename("a", "b").unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["b"]);
    assert_eq!(flags.rules("b").unwrap(), Some(RuleSet::new().with("members", [2])));
}

pub fn store_rename_onto_itself_keeps_rules(flags: &Flags) {
    register_open(flags, &["users"]);
    flags.enable("search", "users", [1]).unwrap();

    let search = Feature::parse("search").unwrap();
    flags.store().rename(&search, &search).unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["search"]);
    assert_eq!(flags.rules("search").unwrap(), Some(RuleSet::new().with("users", [1])));
}

pub fn enabled_checks_predicates(flags: &Flags) {
    flags.register("staff", |actor, _| actor.is("staff"));
    flags.register("radical", |actor, _| actor.is("radical"));
    let plain = Actor::new().set("id", 2).set("staff", false);
    let radical = Actor::new().set("id", 3).set("radical", true);

    assert!(!flags.enabled("search", &staff()).unwrap());

    flags.enable("search", "staff", ValueSet::new()).unwrap();
    assert!(flags.enabled("search", &staff()).unwrap());
    assert!(flags.enabled("SEARCH", &staff()).unwrap());
    assert!(!flags.enabled("search", &plain).unwrap());
    assert!(!flags.enabled("search", &radical).unwrap());

    flags.enable("search", "radical", ValueSet::new()).unwrap();
    assert!(flags.enabled("search", &radical).unwrap());

    flags.disable("search", "staff", ValueSet::new()).unwrap();
    assert!(!flags.enabled("search", &staff()).unwrap());
}

pub fn enabled_uses_rule_values(flags: &Flags) {
    flags.register("great", |actor, ids| actor.in_set("id", ids));
    flags.enable("search", "great", [1, 2, 3]).unwrap();

    assert!(flags.enabled("search", &Actor::new().set("id", 1)).unwrap());
    assert!(!flags.enabled("search", &Actor::new().set("id", 5)).unwrap());
}

pub fn mixed_value_types(flags: &Flags) {
    flags.register("teams", |actor, teams| actor.in_set("team", teams));
    let values: ValueSet = vec![
        Value::from("ops"),
        Value::from(7),
        Value::from("core"),
        Value::from(true),
    ]
    .into();
    flags.enable("search", "teams", values.clone()).unwrap();

    let stored = flags.rules("search").unwrap().unwrap();
    assert_eq!(stored.get("teams"), Some(&values));
    assert!(flags.enabled("search", &Actor::new().set("team", "ops")).unwrap());
    assert!(!flags.enabled("search", &Actor::new().set("team", "sales")).unwrap());
}

pub fn exists_checks_feature_and_group(flags: &Flags) {
    register_open(flags, &["nobody"]);
    flags.add("search").unwrap();
    flags.enable("delete", "nobody", ValueSet::new()).unwrap();

    assert!(flags.exists("search", None).unwrap());
    assert!(!flags.exists("breach", None).unwrap());
    assert!(flags.exists("delete", Some("nobody")).unwrap());
    assert!(!flags.exists("delete", Some("everybody")).unwrap());
    assert!(!flags.exists("search", Some("nobody")).unwrap());
}

pub fn features_filter_by_group(flags: &Flags) {
    register_open(flags, &["staff", "users"]);
    flags.enable("search", "staff", ValueSet::new()).unwrap();
    flags.enable("delete", "users", ValueSet::new()).unwrap();
    flags.enable("archive", "staff", [1]).unwrap();

    assert_eq!(flags.features(None).unwrap(), vec!["archive", "delete", "search"]);
    assert_eq!(flags.features(Some("staff")).unwrap(), vec!["archive", "search"]);
    assert!(flags.features(Some("nobody")).unwrap().is_empty());
}

pub fn breakdown_lists_rules(flags: &Flags) {
    assert!(flags.breakdown().unwrap().is_empty());
    assert!(flags.breakdown_for(&staff()).unwrap().is_empty());

    register_open(flags, &["awesome", "radical", "heinous"]);
    flags.enable("search", "awesome", ValueSet::new()).unwrap();
    flags.enable("search", "heinous", [1, 2]).unwrap();
    flags.enable("delete", "radical", ValueSet::new()).unwrap();
    flags.enable("invite", "heinous", [5, 6]).unwrap();

    let mut expected = Breakdown::new();
    expected.insert("search".into(), RuleSet::new().with("awesome", ValueSet::new()).with("heinous", [1, 2]));
    expected.insert("delete".into(), RuleSet::new().with("radical", ValueSet::new()));
    expected.insert("invite".into(), RuleSet::new().with("heinous", [5, 6]));
    assert_eq!(flags.breakdown().unwrap(), expected);
}

pub fn breakdown_for_matches_enabled(flags: &Flags) {
    flags.register("awesome", |actor, _| actor.is("awesome"));
    flags.register("radical", |actor, _| actor.is("radical"));
    flags.register("heinous", |actor, _| !actor.is("awesome"));

    flags.enable("search", "awesome", ValueSet::new()).unwrap();
    flags.enable("search", "heinous", ValueSet::new()).unwrap();
    flags.enable("delete", "radical", ValueSet::new()).unwrap();
    flags.enable("invite", "heinous", ValueSet::new()).unwrap();

    let actor = Actor::new()
        .set("id", 1)
        .set("awesome", true)
        .set("radical", true);
    let breakdown = flags.breakdown_for(&actor).unwrap();

    let expected: BTreeMap<String, bool> = [("delete", true), ("invite", false), ("search", true)]
        .into_iter()
        .map(|(name, visible)| (name.to_owned(), visible))
        .collect();
    assert_eq!(breakdown, expected);
    for (feature, visible) in &breakdown {
        assert_eq!(flags.enabled(feature, &actor).unwrap(), *visible, "{feature}");
    }
}

pub fn load_replaces_listed_features(flags: &Flags) {
    register_open(flags, &["users", "staff"]);
    flags.enable("search", "users", [1]).unwrap();
    flags.enable("delete", "users", [1]).unwrap();

    let mut dump = Breakdown::new();
    dump.insert(" SEARCH ".into(), RuleSet::new().with("staff", ValueSet::new()));
    dump.insert("invite".into(), RuleSet::new().with("users", [3, 2]));
    flags.load(&dump).unwrap();

    let mut expected = Breakdown::new();
    expected.insert("delete".into(), RuleSet::new().with("users", [1]));
    expected.insert("invite".into(), RuleSet::new().with("users", [2, 3]));
    expected.insert("search".into(), RuleSet::new().with("staff", ValueSet::new()));
    assert_eq!(flags.breakdown().unwrap(), expected);
}

pub fn clear_by_scope(flags: &Flags) {
    register_open(flags, &["staff"]);
    flags.enable("search", "staff", ValueSet::new()).unwrap();

    flags.clear(Scope::Features).unwrap();
    assert!(flags.features(None).unwrap().is_empty());
    assert!(flags.is_registered("staff"));

    flags.enable("search", "staff", ValueSet::new()).unwrap();
    flags.clear(Scope::Groups).unwrap();
    assert!(flags.registered().is_empty());
    assert_eq!(flags.features(None).unwrap(), vec!["search"]);

    register_open(flags, &["staff"]);
    flags.clear(Scope::All).unwrap();
    assert!(flags.features(None).unwrap().is_empty());
    assert!(flags.registered().is_empty());
}
