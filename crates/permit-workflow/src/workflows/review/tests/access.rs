use axum::http::{HeaderMap, HeaderValue};

use crate::workflows::error::ValidationError;
use crate::workflows::review::access::{STAFF_POSITION_HEADER, STAFF_UNIT_HEADER, USER_ID_HEADER, USER_TYPE_HEADER};
use crate::workflows::review::{
    resolve_stage_access, ActingUser, ReviewStage, StaffPosition, StaffUnit, StageAccess,
    UserType,
};

#[test]
fn unit_and_position_map_to_their_stage() {
    let registry = resolve_stage_access(Some(StaffUnit::Registry), None, UserType::Staff);
    assert_eq!(registry.editable_stages(), vec![ReviewStage::Registry]);

    let compliance = resolve_stage_access(
        Some(StaffUnit::Compliance),
        Some(StaffPosition::Officer),
        UserType::Staff,
    );
    assert_eq!(compliance.editable_stages(), vec![ReviewStage::Compliance]);

    let md = resolve_stage_access(None, Some(StaffPosition::ManagingDirector), UserType::Staff);
    assert_eq!(md.editable_stages(), vec![ReviewStage::ManagingDirector]);

    let directorate = resolve_stage_access(Some(StaffUnit::Directorate), None, UserType::Staff);
    assert_eq!(directorate.editable_stages(), vec![ReviewStage::Directorate]);
}

#[test]
fn users_matching_several_rules_get_the_union() {
    let access = resolve_stage_access(
        Some(StaffUnit::Compliance),
        Some(StaffPosition::ManagingDirector),
        UserType::Staff,
    );
    assert_eq!(
        access.editable_stages(),
        vec![ReviewStage::Compliance, ReviewStage::ManagingDirector]
    );
}

#[test]
fn elevated_accounts_edit_every_stage() {
    for user_type in [UserType::Admin, UserType::SuperAdmin] {
        let access = resolve_stage_access(None, None, user_type);
        assert_eq!(access, StageAccess::Elevated);
        assert_eq!(access.editable_stages(), ReviewStage::ordered().to_vec());
        assert!(!access.is_read_only());
    }
}

#[test]
fn everyone_else_is_read_only() {
    for (unit, position, user_type) in [
        (None, None, UserType::Public),
        (Some(StaffUnit::Revenue), Some(StaffPosition::Manager), UserType::Staff),
        (Some(StaffUnit::Finance), None, UserType::Staff),
        (Some(StaffUnit::Other), Some(StaffPosition::Director), UserType::Staff),
    ] {
        let access = resolve_stage_access(unit, position, user_type);
        assert!(access.is_read_only(), "{unit:?} {position:?} {user_type:?}");
        assert_eq!(access, StageAccess::none());
        let view = access.view();
        assert!(view.read_only);
        assert!(view.editable_stages.is_empty());
    }
}

#[test]
fn fee_management_is_limited_to_revenue_finance_and_elevated() {
    let revenue = ActingUser::staff("rev-1", Some(StaffUnit::Revenue), None);
    let finance = ActingUser::staff("fin-1", Some(StaffUnit::Finance), None);
    let registry = ActingUser::staff("reg-1", Some(StaffUnit::Registry), None);

    assert!(revenue.can_manage_fees());
    assert!(finance.can_manage_fees());
    assert!(ActingUser::admin("root").can_manage_fees());
    assert!(!registry.can_manage_fees());
    assert!(!ActingUser::public("applicant").can_manage_fees());
    assert!(registry.authorize_fee_management().is_err());
}

#[test]
fn headers_resolve_to_an_acting_user() {
    let mut headers = HeaderMap::new();
    headers.insert(USER_ID_HEADER, HeaderValue::from_static("md-7"));
    headers.insert(USER_TYPE_HEADER, HeaderValue::from_static("staff"));
    headers.insert(STAFF_UNIT_HEADER, HeaderValue::from_static("Compliance"));
    headers.insert(
        STAFF_POSITION_HEADER,
        HeaderValue::from_static("managing-director"),
    );

    let user = ActingUser::from_headers(&headers).expect("headers parse");
    assert_eq!(user.user_id, "md-7");
    assert_eq!(user.user_type, UserType::Staff);
    assert_eq!(user.staff_unit, Some(StaffUnit::Compliance));
    assert_eq!(user.staff_position, Some(StaffPosition::ManagingDirector));
    assert!(user.stage_access().can_edit(ReviewStage::ManagingDirector));
}

#[test]
fn missing_identity_defaults_are_explicit() {
    let mut headers = HeaderMap::new();
    assert_eq!(
        ActingUser::from_headers(&headers),
        Err(ValidationError::MissingField(USER_ID_HEADER))
    );

    headers.insert(USER_ID_HEADER, HeaderValue::from_static("applicant-9"));
    let user = ActingUser::from_headers(&headers).expect("public user");
    assert_eq!(user.user_type, UserType::Public);
    assert!(user.stage_access().is_read_only());

    headers.insert(USER_TYPE_HEADER, HeaderValue::from_static("owner"));
    assert!(matches!(
        ActingUser::from_headers(&headers),
        Err(ValidationError::InvalidHeader { header, .. }) if header == USER_TYPE_HEADER
    ));
}

#[test]
fn stage_authorization_reports_permission_denied() {
    let registry = ActingUser::staff("reg-1", Some(StaffUnit::Registry), None);
    assert!(registry.authorize_stage(ReviewStage::Registry).is_ok());
    let err = registry
        .authorize_stage(ReviewStage::Compliance)
        .expect_err("registry cannot edit compliance");
    assert_eq!(err.kind(), "permission_denied");
}
