//! Integration tests for the rule set pattern language

use shroud::anonymization::matches;
use shroud::domain::{PatternExpr, Record, RuleConfig, RuleSet, Value};
use shroud::record;
use test_case::test_case;

fn single(field: &str, pattern: &str) -> RuleSet {
    RuleConfig::new().field(field, pattern).into()
}

fn eval(rules: &RuleSet, record: &Record) -> bool {
    matches(rules, record).unwrap()
}

#[test_case("<=100", 50, true ; "le below")]
#[test_case("<=100", 100, true ; "le equal")]
#[test_case("<=100", 150, false ; "le above")]
#[test_case("<5", 5, false ; "lt equal")]
#[test_case(">=10", 10, true ; "ge equal")]
#[test_case(">10", 11, true ; "gt above")]
#[test_case("=42", 42, true ; "explicit equality")]
#[test_case("42", 42, true ; "implicit equality")]
#[test_case("!=42", 41, true ; "not equal")]
#[test_case("<>42", 42, false ; "not equal on equal value")]
#[test_case("1|2|3", 2, true ; "numeric alternatives")]
#[test_case("=9007199254740992", 9_007_199_254_740_993, false ; "bigint equality is exact")]
#[test_case(">9007199254740992", 9_007_199_254_740_993, true ; "bigint ordering is exact")]
fn test_numeric_operators(pattern: &str, id: i64, expected: bool) {
    assert_eq!(eval(&single("id", pattern), &record! { "id" => id }), expected);
}

#[test_case("%@visitor.com", "a@visitor.com", true ; "suffix wildcard")]
#[test_case("%@visitor.com", "a@example.com", false ; "suffix wildcard miss")]
#[test_case("admin%", "administrator", true ; "prefix wildcard")]
#[test_case("%test%", "my-test-account", true ; "contains wildcard")]
#[test_case("archived|deleted", "archived", true ; "first alternative")]
#[test_case("archived|deleted", "deleted", true ; "second alternative")]
#[test_case("archived|deleted", "active", false ; "no alternative")]
#[test_case(">=2024-01-01", "2024-06-30", true ; "lexicographic date")]
#[test_case(">=2024-01-01", "2023-12-31", false ; "lexicographic date before")]
fn test_text_operators(pattern: &str, status: &str, expected: bool) {
    assert_eq!(
        eval(&single("status", pattern), &record! { "id" => 1, "status" => status }),
        expected
    );
}

#[test_case("<=100" ; "comparison")]
#[test_case("%@visitor.com" ; "wildcard")]
#[test_case("active" ; "equality")]
#[test_case("!=active" ; "negated comparison")]
fn test_null_never_satisfies_value_patterns(pattern: &str) {
    let record = record! { "id" => 1, "status" => Value::Null };
    assert!(!eval(&single("status", pattern), &record));
}

#[test_case("NULL", true ; "null token")]
#[test_case("is null", true ; "is null lowercase")]
#[test_case("IS NOT NULL", false ; "is not null")]
fn test_null_tests(pattern: &str, expected: bool) {
    let record = record! { "id" => 1, "deleted_at" => Value::Null };
    assert_eq!(eval(&single("deleted_at", pattern), &record), expected);
}

#[test]
fn test_empty_rule_set_matches_everything() {
    let empty = RuleSet::default();
    assert!(eval(&empty, &record! { "id" => 1 }));
    assert!(eval(&empty, &record! { "id" => 2, "status" => Value::Null }));
}

#[test]
fn test_rule_config_fields_combine_with_and() {
    let rules: RuleSet = RuleConfig::new()
        .field("status", "active")
        .field("id", "<=10")
        .into();
    assert!(eval(&rules, &record! { "id" => 5, "status" => "active" }));
    assert!(!eval(&rules, &record! { "id" => 50, "status" => "active" }));
    assert!(!eval(&rules, &record! { "id" => 5, "status" => "archived" }));
}

#[test]
fn test_rule_configs_combine_with_or() {
    let first = RuleConfig::new().field("id", "<=2");
    let second = RuleConfig::new().field("email", "%@visitor.com");
    let both = RuleSet::new(vec![first.clone(), second.clone()]);

    let records = [
        record! { "id" => 1, "email" => "a@example.com" },
        record! { "id" => 7, "email" => "b@visitor.com" },
        record! { "id" => 9, "email" => "c@example.com" },
    ];
    for record in &records {
        let expected = eval(&first.clone().into(), record) || eval(&second.clone().into(), record);
        assert_eq!(eval(&both, record), expected);
    }
}

#[test]
fn test_list_elements_are_taken_verbatim() {
    let rules: RuleSet = RuleConfig::new()
        .field("status", PatternExpr::from(vec!["a|b", "c"]))
        .into();
    assert!(eval(&rules, &record! { "id" => 1, "status" => "a|b" }));
    assert!(eval(&rules, &record! { "id" => 1, "status" => "c" }));
    assert!(!eval(&rules, &record! { "id" => 1, "status" => "a" }));
}

#[test]
fn test_missing_field_reads_as_null() {
    let rules = single("deleted_at", "IS NULL");
    assert!(eval(&rules, &record! { "id" => 1 }));
}
