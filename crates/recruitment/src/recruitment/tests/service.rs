use super::common::*;

use crate::access::{Caller, DenyReason, ElevationPolicy, IdentityId, Role, StoreError};
use crate::documents::{DocumentKind, RejectionReason};
use crate::recruitment::{
    ApplicationId, ApplicationStatus, PostingId, PostingUpdate, RecruitmentError, Upload,
};

fn id_of(caller: &Caller) -> IdentityId {
    caller.id().expect("identified caller")
}

#[test]
fn candidate_submission_stores_documents_under_owner_prefix() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let candidate = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");

    let application = h
        .service
        .submit_application(
            &candidate,
            posting.id,
            Some(pdf("My CV.pdf")),
            Some(docx("letter.docx")),
        )
        .expect("application accepted");

    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(application.candidate, id_of(&candidate));
    let cv = application.cv.as_ref().expect("cv stored");
    let prefix = format!("users/{}/", id_of(&candidate));
    assert!(cv.key.starts_with(&prefix), "unexpected key {}", cv.key);
    assert!(cv.key.contains("/cv/My_CV-"));
    assert!(cv.key.ends_with(".pdf"));
    assert_eq!(cv.original_name, "My CV.pdf");
    let letter = application.cover_letter.as_ref().expect("letter stored");
    assert!(letter.key.contains("/cover_letter/letter-"));
    assert_eq!(h.documents.keys().len(), 2);
}

#[test]
fn second_application_to_same_posting_conflicts() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let candidate = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");

    h.service
        .submit_application(&candidate, posting.id, Some(pdf("cv.pdf")), None)
        .expect("first application");
    let err = h
        .service
        .submit_application(&candidate, posting.id, Some(pdf("cv.pdf")), None)
        .expect_err("duplicate rejected");

    assert!(matches!(err, RecruitmentError::Conflict("application")));
    assert_eq!(h.documents.keys().len(), 1);
}

#[test]
fn rejected_upload_persists_nothing() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let candidate = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");

    let err = h
        .service
        .submit_application(
            &candidate,
            posting.id,
            Some(Upload::new("resume.exe", b"MZ\x90\x00".to_vec())),
            None,
        )
        .expect_err("executable refused");
    assert!(matches!(
        err,
        RecruitmentError::Rejected {
            kind: DocumentKind::Cv,
            reason: RejectionReason::BadExtension
        }
    ));

    let err = h
        .service
        .submit_application(
            &candidate,
            posting.id,
            Some(pdf("cv.pdf")),
            Some(Upload::new("letter.pdf", docx("x.docx").bytes)),
        )
        .expect_err("mismatched cover letter refused");
    assert!(matches!(
        err,
        RecruitmentError::Rejected {
            kind: DocumentKind::CoverLetter,
            reason: RejectionReason::InvalidFormat
        }
    ));

    assert!(h.documents.keys().is_empty());
    assert!(h
        .service
        .list_applications(&candidate)
        .expect("listing")
        .is_empty());
}

#[test]
fn only_candidates_and_operators_may_apply() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let roleless = h.member("nobody", None);
    let operator = h.elevated("root");
    let posting = h.posting(&admin, "Backend Engineer");

    let denied = |caller: &Caller| {
        match h
            .service
            .submit_application(caller, posting.id, Some(pdf("cv.pdf")), None)
        {
            Err(RecruitmentError::Forbidden(reason)) => reason,
            other => panic!("expected forbidden, got {other:?}"),
        }
    };
    assert_eq!(denied(&recruiter), DenyReason::RoleNotPermitted(Role::Recruiter));
    assert_eq!(denied(&roleless), DenyReason::NoRole);
    assert_eq!(denied(&Caller::Anonymous), DenyReason::Anonymous);

    h.service
        .submit_application(&operator, posting.id, Some(pdf("cv.pdf")), None)
        .expect("operator bypasses role requirement");
}

#[test]
fn admin_equivalent_operator_cannot_apply() {
    let h = harness_with(
        std::sync::Arc::new(crate::memory::InMemoryInbox::new()),
        ElevationPolicy::AdminEquivalent,
    );
    let operator = h.elevated("root");
    let posting = h.posting(&operator, "Backend Engineer");

    let err = h
        .service
        .submit_application(&operator, posting.id, Some(pdf("cv.pdf")), None)
        .expect_err("operator treated as admin");
    assert!(matches!(
        err,
        RecruitmentError::Forbidden(DenyReason::RoleNotPermitted(Role::Admin))
    ));
}

#[test]
fn inactive_or_missing_posting_refuses_applications() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let candidate = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    h.service
        .update_posting(
            &admin,
            posting.id,
            PostingUpdate {
                active: Some(false),
                ..PostingUpdate::default()
            },
        )
        .expect("posting closed");

    let err = h
        .service
        .submit_application(&candidate, posting.id, Some(pdf("cv.pdf")), None)
        .expect_err("closed posting");
    assert!(matches!(err, RecruitmentError::InactivePosting));

    let err = h
        .service
        .submit_application(&candidate, PostingId(999), None, None)
        .expect_err("unknown posting");
    assert!(matches!(err, RecruitmentError::NotFound("posting")));
}

#[test]
fn application_listing_is_scoped_by_role() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");

    let first = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");
    h.service
        .submit_application(&dana, posting.id, Some(pdf("cv.pdf")), None)
        .expect("dana applies");

    let own = h.service.list_applications(&cleo).expect("own listing");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, first.id);

    assert_eq!(h.service.list_applications(&recruiter).expect("staff").len(), 2);
    assert_eq!(h.service.list_applications(&admin).expect("staff").len(), 2);
    assert!(matches!(
        h.service.list_applications(&Caller::Anonymous),
        Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
    ));
}

#[test]
fn record_access_allows_owner_and_staff_only() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");

    h.service
        .get_application(&cleo, application.id)
        .expect("owner reads");
    h.service
        .get_application(&recruiter, application.id)
        .expect("recruiter reads");
    assert!(matches!(
        h.service.get_application(&dana, application.id),
        Err(RecruitmentError::Forbidden(DenyReason::RoleNotPermitted(
            Role::Candidate
        )))
    ));
    assert!(matches!(
        h.service.get_application(&cleo, ApplicationId(404)),
        Err(RecruitmentError::NotFound("application"))
    ));
}

#[test]
fn anonymous_record_access_is_refused_before_lookup() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");

    for id in [application.id, ApplicationId(404)] {
        assert!(matches!(
            h.service.get_application(&Caller::Anonymous, id),
            Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
        ));
        assert!(matches!(
            h.service.download_cv(&Caller::Anonymous, id),
            Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
        ));
        assert!(matches!(
            h.service
                .amend_documents(&Caller::Anonymous, id, Some(pdf("x.pdf")), None),
            Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
        ));
        assert!(matches!(
            h.service.delete_application(&Caller::Anonymous, id),
            Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
        ));
    }
}

#[test]
fn owner_withdraws_and_staff_remove_applications() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let backend = h.posting(&admin, "Backend Engineer");
    let frontend = h.posting(&admin, "Frontend Engineer");
    let first = h
        .service
        .submit_application(&cleo, backend.id, Some(pdf("cv.pdf")), Some(docx("letter.docx")))
        .expect("cleo applies");
    let second = h
        .service
        .submit_application(&cleo, frontend.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies again");
    assert_eq!(h.documents.keys().len(), 3);

    assert!(matches!(
        h.service.delete_application(&dana, first.id),
        Err(RecruitmentError::Forbidden(DenyReason::RoleNotPermitted(
            Role::Candidate
        )))
    ));

    h.service
        .delete_application(&cleo, first.id)
        .expect("owner withdraws");
    assert_eq!(h.documents.keys().len(), 1);
    assert!(matches!(
        h.service.get_application(&cleo, first.id),
        Err(RecruitmentError::NotFound("application"))
    ));
    assert!(matches!(
        h.service.delete_application(&cleo, first.id),
        Err(RecruitmentError::NotFound("application"))
    ));

    h.service
        .delete_application(&recruiter, second.id)
        .expect("recruiter removes");
    assert!(h.documents.keys().is_empty());
    assert!(h.service.list_applications(&cleo).expect("listing").is_empty());

    h.service
        .submit_application(&cleo, backend.id, Some(pdf("cv.pdf")), None)
        .expect("withdrawn application can be filed again");
}

#[test]
fn failed_document_write_leaves_no_files_behind() {
    let h = harness_refusing("/cover_letter/");
    let admin = h.member("ada", Some(Role::Admin));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");

    assert!(matches!(
        h.service.submit_application(
            &cleo,
            posting.id,
            Some(pdf("cv.pdf")),
            Some(docx("letter.docx"))
        ),
        Err(RecruitmentError::Storage(_))
    ));
    assert!(h.documents.keys().is_empty());
    assert!(h.service.list_applications(&cleo).expect("listing").is_empty());

    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cv alone is stored");
    assert!(matches!(
        h.service.amend_documents(
            &cleo,
            application.id,
            Some(pdf("new.pdf")),
            Some(docx("letter.docx"))
        ),
        Err(RecruitmentError::Storage(_))
    ));
    assert_eq!(
        h.documents.keys(),
        vec![application.cv.as_ref().expect("cv").key.clone()]
    );
}

#[test]
fn registration_requires_a_unique_email() {
    let h = harness();

    h.service
        .register_candidate("erin", "Erin@Example.test")
        .expect("registered");

    assert!(matches!(
        h.service.register_candidate("erin2", "erin@example.TEST"),
        Err(RecruitmentError::Directory(StoreError::DuplicateEmail(_)))
    ));
    for email in ["", "   ", "erin", "@example.test", "erin@localhost"] {
        assert!(
            matches!(
                h.service.register_candidate("fresh", email),
                Err(RecruitmentError::Invalid(_))
            ),
            "{email:?} should be refused"
        );
    }
    h.service
        .register_candidate("fresh", "fresh@example.test")
        .expect("handle still free after refusals");
}

#[test]
fn cv_download_returns_stored_bytes() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let upload = pdf("resume.pdf");
    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(upload.clone()), None)
        .expect("cleo applies");

    let download = h
        .service
        .download_cv(&admin, application.id)
        .expect("admin downloads");
    assert_eq!(download.bytes, upload.bytes);
    assert_eq!(download.content_type, mime::APPLICATION_PDF);
    assert!(download.file_name.starts_with("resume-"));

    h.service
        .download_cv(&cleo, application.id)
        .expect("owner downloads");
    assert!(matches!(
        h.service.download_cv(&dana, application.id),
        Err(RecruitmentError::Forbidden(_))
    ));
}

#[test]
fn cv_download_without_cv_is_not_found() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let application = h
        .service
        .submit_application(&cleo, posting.id, None, Some(docx("letter.docx")))
        .expect("letter only");

    assert!(matches!(
        h.service.download_cv(&admin, application.id),
        Err(RecruitmentError::NotFound("cv"))
    ));
}

#[test]
fn owner_can_replace_documents_but_nothing_else() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("old.pdf")), None)
        .expect("cleo applies");
    h.service
        .update_status(&recruiter, application.id, ApplicationStatus::InReview)
        .expect("moved to review");

    let amended = h
        .service
        .amend_documents(&cleo, application.id, Some(pdf("new.pdf")), None)
        .expect("owner amends");
    assert_eq!(amended.status, ApplicationStatus::InReview);
    assert_eq!(amended.cv.as_ref().map(|cv| cv.original_name.as_str()), Some("new.pdf"));
    let replaced = application.cv.as_ref().expect("original cv").key.clone();
    assert_eq!(
        h.documents.keys(),
        vec![amended.cv.as_ref().expect("new cv").key.clone()]
    );
    assert!(!h.documents.keys().contains(&replaced));

    assert!(matches!(
        h.service
            .amend_documents(&dana, application.id, Some(pdf("x.pdf")), None),
        Err(RecruitmentError::Forbidden(_))
    ));
    assert!(matches!(
        h.service.amend_documents(&cleo, application.id, None, None),
        Err(RecruitmentError::Invalid(_))
    ));
    assert!(matches!(
        h.service.amend_documents(
            &cleo,
            application.id,
            Some(Upload::new("new.docx", b"#!/bin/sh\nrm -rf /".to_vec())),
            None
        ),
        Err(RecruitmentError::Rejected { .. })
    ));
}

#[test]
fn status_changes_are_staff_only() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let application = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");

    assert!(matches!(
        h.service
            .update_status(&cleo, application.id, ApplicationStatus::Accepted),
        Err(RecruitmentError::Forbidden(_))
    ));
    let updated = h
        .service
        .update_status(&admin, application.id, ApplicationStatus::Accepted)
        .expect("admin accepts");
    assert_eq!(updated.status, ApplicationStatus::Accepted);
}

#[test]
fn scores_are_bounded_rounded_and_scoped() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let dana = h.member("dana", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    let cleo_app = h
        .service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");
    let dana_app = h
        .service
        .submit_application(&dana, posting.id, Some(pdf("cv.pdf")), None)
        .expect("dana applies");

    let scored = h
        .service
        .record_score(&recruiter, cleo_app.id, Some(87.456), " strong match ".to_string())
        .expect("scored");
    let score = scored.score.expect("score attached");
    assert_eq!(score.ai_score, Some(87.46));
    assert_eq!(score.recommendation, "strong match");

    for bad in [1000.0, -1000.0, f32::NAN, f32::INFINITY] {
        assert!(matches!(
            h.service
                .record_score(&recruiter, dana_app.id, Some(bad), String::new()),
            Err(RecruitmentError::InvalidScore)
        ));
    }
    h.service
        .record_score(&admin, dana_app.id, None, "needs human review".to_string())
        .expect("score without number");
    assert!(matches!(
        h.service.record_score(&cleo, cleo_app.id, Some(1.0), String::new()),
        Err(RecruitmentError::Forbidden(_))
    ));

    assert_eq!(h.service.list_scores(&admin).expect("staff scores").len(), 2);
    let own = h.service.list_scores(&cleo).expect("own scores");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].application_id, cleo_app.id);
}

#[test]
fn posting_management_and_visibility() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));

    assert!(matches!(
        h.service.create_posting(&cleo, draft("Sneaky")),
        Err(RecruitmentError::Forbidden(_))
    ));
    assert!(matches!(
        h.service.create_posting(&admin, draft("   ")),
        Err(RecruitmentError::Invalid(_))
    ));
    assert!(matches!(
        h.service.create_posting(&admin, draft(&"x".repeat(201))),
        Err(RecruitmentError::Invalid(_))
    ));

    let backend = h.posting(&recruiter, "Backend Engineer");
    let designer = h.posting(&admin, "Product Designer");
    h.service
        .update_posting(
            &recruiter,
            designer.id,
            PostingUpdate {
                active: Some(false),
                ..PostingUpdate::default()
            },
        )
        .expect("closed");

    let visible = h.service.list_postings(&cleo, None).expect("candidate view");
    assert_eq!(visible.iter().map(|p| p.id).collect::<Vec<_>>(), vec![backend.id]);
    assert_eq!(h.service.list_postings(&recruiter, None).expect("staff view").len(), 2);

    let found = h
        .service
        .list_postings(&cleo, Some("BACKEND"))
        .expect("search");
    assert_eq!(found.len(), 1);
    assert!(h
        .service
        .list_postings(&cleo, Some("kotlin"))
        .expect("search")
        .is_empty());
    assert!(matches!(
        h.service.list_postings(&Caller::Anonymous, None),
        Err(RecruitmentError::Forbidden(DenyReason::Anonymous))
    ));
}

#[test]
fn deleting_a_posting_drops_its_applications() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));
    let cleo = h.member("cleo", Some(Role::Candidate));
    let posting = h.posting(&admin, "Backend Engineer");
    h.service
        .submit_application(&cleo, posting.id, Some(pdf("cv.pdf")), None)
        .expect("cleo applies");

    assert_eq!(
        h.service
            .posting_applications(&admin, posting.id)
            .expect("admin lists")
            .len(),
        1
    );
    assert!(matches!(
        h.service.posting_applications(&recruiter, posting.id),
        Err(RecruitmentError::Forbidden(DenyReason::RoleNotPermitted(
            Role::Recruiter
        )))
    ));

    h.service
        .delete_posting(&admin, posting.id)
        .expect("posting deleted");
    assert!(h.service.list_applications(&admin).expect("listing").is_empty());
    assert!(h.documents.keys().is_empty());
    assert!(matches!(
        h.service.delete_posting(&admin, posting.id),
        Err(RecruitmentError::NotFound("posting"))
    ));
}

#[test]
fn registration_and_role_assignment() {
    let h = harness();
    let admin = h.member("ada", Some(Role::Admin));
    let recruiter = h.member("rex", Some(Role::Recruiter));

    let identity = h
        .service
        .register_candidate(" newbie ", "newbie@example.test")
        .expect("registered");
    assert_eq!(identity.handle, "newbie");
    let caller = Caller::Identified(identity.clone());
    assert_eq!(h.service.gate().role_of(&caller), Some(Role::Candidate));

    assert!(matches!(
        h.service.register_candidate("newbie", "another@example.test"),
        Err(RecruitmentError::Directory(StoreError::DuplicateHandle(_)))
    ));
    assert!(matches!(
        h.service.register_candidate("  ", "blank@example.test"),
        Err(RecruitmentError::Invalid(_))
    ));

    assert!(matches!(
        h.service
            .assign_role(&recruiter, identity.id, Role::Recruiter),
        Err(RecruitmentError::Forbidden(_))
    ));
    h.service
        .assign_role(&admin, identity.id, Role::Recruiter)
        .expect("promoted");
    assert_eq!(h.service.gate().role_of(&caller), Some(Role::Recruiter));
    assert!(matches!(
        h.service.assign_role(&admin, IdentityId(9_999), Role::Admin),
        Err(RecruitmentError::NotFound("identity"))
    ));
}

#[test]
fn unknown_caller_ids_resolve_to_anonymous() {
    let h = harness();
    let cleo = h.member("cleo", Some(Role::Candidate));

    assert_eq!(h.service.resolve_caller(None), Caller::Anonymous);
    assert_eq!(h.service.resolve_caller(Some(IdentityId(777))), Caller::Anonymous);
    assert_eq!(h.service.resolve_caller(cleo.id()), cleo);
}
