// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    mayor    = { RoleType::Mayor,    "mayor" },
    deacon   = { RoleType::Deacon,   "deacon" },
    witness  = { RoleType::Witness,  "witness" },
    refinery = { RoleType::Refinery, "refinery" },
    crew     = { RoleType::Crew,     "crew" },
    polecat  = { RoleType::Polecat,  "polecat" },
)]
fn role_str_roundtrips(role: RoleType, s: &str) {
    assert_eq!(role.as_str(), s);
    assert_eq!(RoleType::parse(s), Some(role));
}

#[test]
fn role_parse_rejects_unknown() {
    assert_eq!(RoleType::parse("warboy"), None);
    assert_eq!(RoleType::parse(""), None);
    assert_eq!(RoleType::parse("Mayor"), None);
}

#[yare::parameterized(
    town_mayor   = { "mayor",              RoleType::Mayor,    None,             None },
    town_deacon  = { "deacon",             RoleType::Deacon,   None,             None },
    witness      = { "gastown-witness",    RoleType::Witness,  Some("gastown"),  None },
    refinery     = { "gastown-refinery",   RoleType::Refinery, Some("gastown"),  None },
    crew         = { "gastown-crew-joe",   RoleType::Crew,     Some("gastown"),  Some("joe") },
    polecat      = { "gastown-polecat-slit", RoleType::Polecat, Some("gastown"), Some("slit") },
    dashed_rig   = { "bullet-farm-witness", RoleType::Witness, Some("bullet-farm"), None },
    dashed_name  = { "gastown-crew-mad-max", RoleType::Crew,   Some("gastown"),  Some("mad-max") },
)]
fn parse_dashed(s: &str, role: RoleType, rig: Option<&str>, name: Option<&str>) {
    let id = ParsedIdentity::parse_dashed(s).unwrap();
    assert_eq!(id.role, role);
    assert_eq!(id.rig.as_deref(), rig);
    assert_eq!(id.name.as_deref(), name);
    // dashed form round-trips
    assert_eq!(id.dashed(), s);
}

#[yare::parameterized(
    town_mayor = { "mayor",              RoleType::Mayor,    None,            None },
    witness    = { "gastown/witness",    RoleType::Witness,  Some("gastown"), None },
    crew       = { "gastown/crew/joe",   RoleType::Crew,     Some("gastown"), Some("joe") },
    polecat    = { "gastown/polecat/slit", RoleType::Polecat, Some("gastown"), Some("slit") },
)]
fn parse_slashed(s: &str, role: RoleType, rig: Option<&str>, name: Option<&str>) {
    let id = ParsedIdentity::parse_slashed(s).unwrap();
    assert_eq!(id.role, role);
    assert_eq!(id.rig.as_deref(), rig);
    assert_eq!(id.name.as_deref(), name);
    assert_eq!(id.slashed(), s);
}

#[test]
fn dashed_and_slashed_forms_round_trip() {
    let id = ParsedIdentity::named(RoleType::Crew, "gastown", "joe").unwrap();
    assert_eq!(ParsedIdentity::parse_dashed(&id.dashed()).unwrap(), id);
    assert_eq!(ParsedIdentity::parse_slashed(&id.slashed()).unwrap(), id);
}

#[yare::parameterized(
    empty          = { "" },
    no_role        = { "gastown-warboy" },
    bare_rig       = { "gastown" },
)]
fn parse_dashed_rejects(s: &str) {
    assert!(ParsedIdentity::parse_dashed(s).is_err());
}

#[test]
fn named_roles_require_a_name() {
    let err = ParsedIdentity::parse_dashed("gastown-polecat").unwrap_err();
    assert!(matches!(err, IdentityError::MissingName { role: RoleType::Polecat, .. }));
}

#[test]
fn singleton_roles_reject_a_name() {
    let err = ParsedIdentity::parse_slashed("gastown/witness/extra").unwrap_err();
    assert!(matches!(err, IdentityError::UnexpectedName { role: RoleType::Witness, .. }));
}

#[test]
fn town_roles_reject_a_rig() {
    let err = ParsedIdentity::new(RoleType::Mayor, Some("gastown".into()), None).unwrap_err();
    assert!(matches!(err, IdentityError::UnexpectedRig { role: RoleType::Mayor, .. }));
}

#[yare::parameterized(
    mayor   = { RoleType::Mayor,   None,            None,         "gt-mayor" },
    witness = { RoleType::Witness, Some("gastown"), None,         "gt-gastown-witness" },
    crew    = { RoleType::Crew,    Some("gastown"), Some("joe"),  "gt-gastown-crew-joe" },
    polecat = { RoleType::Polecat, Some("gastown"), Some("slit"), "gt-gastown-slit" },
)]
fn session_names(role: RoleType, rig: Option<&str>, name: Option<&str>, expected: &str) {
    let id = ParsedIdentity::new(
        role,
        rig.map(String::from),
        name.map(String::from),
    )
    .unwrap();
    assert_eq!(id.session_name("gt"), expected);
}

#[test]
fn bead_id_keeps_the_role_segment_for_polecats() {
    let id = ParsedIdentity::named(RoleType::Polecat, "gastown", "slit").unwrap();
    assert_eq!(id.bead_id("gt"), "gt-gastown-polecat-slit");
    assert_eq!(id.session_name("gt"), "gt-gastown-slit");
}

#[test]
fn mail_address_is_slashed_form() {
    let id = ParsedIdentity::rig_singleton(RoleType::Witness, "gastown").unwrap();
    assert_eq!(id.mail_address(), "gastown/witness");
    assert_eq!(ParsedIdentity::town(RoleType::Deacon).unwrap().mail_address(), "deacon");
}

#[test]
fn custom_prefix_flows_through_all_shapes() {
    let id = ParsedIdentity::named(RoleType::Polecat, "citadel", "nux").unwrap();
    assert_eq!(id.session_name("acme"), "acme-citadel-nux");
    assert_eq!(id.bead_id("acme"), "acme-citadel-polecat-nux");
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_role() -> impl Strategy<Value = RoleType> {
        prop_oneof![
            Just(RoleType::Mayor),
            Just(RoleType::Deacon),
            Just(RoleType::Witness),
            Just(RoleType::Refinery),
            Just(RoleType::Crew),
            Just(RoleType::Polecat),
        ]
    }

    fn arb_segment() -> impl Strategy<Value = String> {
        // Lowercase alphanumeric segments, no separators, no role keywords
        "[a-z0-9]{1,12}".prop_filter("not a role keyword", |s| RoleType::parse(s).is_none())
    }

    fn arb_identity() -> impl Strategy<Value = ParsedIdentity> {
        (arb_role(), arb_segment(), arb_segment()).prop_map(|(role, rig, name)| {
            let rig = (!role.is_town_level()).then_some(rig);
            let name = role.is_named().then_some(name);
            ParsedIdentity { role, rig, name }
        })
    }

    proptest! {
        #[test]
        fn dashed_form_round_trips(id in arb_identity()) {
            let parsed = ParsedIdentity::parse_dashed(&id.dashed()).unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn slashed_form_round_trips(id in arb_identity()) {
            let parsed = ParsedIdentity::parse_slashed(&id.slashed()).unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn serde_round_trips(id in arb_identity()) {
            let json = serde_json::to_string(&id).unwrap();
            let parsed: ParsedIdentity = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
