use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use http::{HeaderMap, HeaderValue, StatusCode};
use openid4vp_verifier::{
    api::{
        VerifierApi, AUTHORIZE_BASE_URL_HEADER, ERROR_REDIRECT_URI_HEADER, RESPONSE_MODE_HEADER,
        SUCCESS_REDIRECT_URI_HEADER,
    },
    config::{VerifierServiceConfig, MAX_SESSION_TTL_SECS},
    core::object::UntypedObject,
    verifier::{session::MemoryStore, Verifier, VerifierError, PANIC_DETAIL, TIMEOUT_DETAIL},
};
use serde_json::{json, Value as Json};
use tokio::sync::Barrier;

mod support;

use support::*;

async fn init(api: &VerifierApi, body: Json, headers: &HeaderMap) -> (String, String) {
    let response = api.verify(headers, body.to_string().as_bytes()).await;
    assert_eq!(response.status(), StatusCode::OK, "{}", response.body());

    let url = response.into_body();
    let state = query_parameters(&url)["state"].clone();
    (state, url)
}

async fn definition_id(api: &VerifierApi, state: &str) -> String {
    api.verifier()
        .presentation_definition(state)
        .await
        .unwrap()
        .unwrap()
        .id()
        .clone()
}

async fn status(api: &VerifierApi, state: &str) -> Json {
    let response = api.session(state).await;
    assert_eq!(response.status(), StatusCode::OK, "{}", response.body());
    serde_json::from_str(response.body()).unwrap()
}

#[tokio::test]
async fn verifiable_id_with_default_policies() {
    let api = api();

    let (state, url) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    assert!(url.starts_with("openid4vp://authorize?"));
    let query = query_parameters(&url);
    assert_eq!(query["response_type"], "vp_token");
    assert_eq!(query["response_mode"], "direct_post");
    assert_eq!(
        query["response_uri"],
        format!("http://localhost:7003/openid4vc/verify/{state}")
    );
    assert_eq!(query["client_id"], query["response_uri"]);
    assert!(!query["nonce"].is_empty());
    let definition: Json = serde_json::from_str(&query["presentation_definition"]).unwrap();
    assert_eq!(definition["input_descriptors"][0]["id"], "VerifiableId");

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::OK, "{}", response.body());
    assert_eq!(response.body(), "");

    let status = status(&api, &state).await;
    assert_eq!(status["verificationResult"], true);
    let policy_results = status["policyResults"].as_array().unwrap();
    assert_eq!(policy_results.len(), 2);
    assert_eq!(policy_results[0]["policy"], "signature");
    assert_eq!(policy_results[0]["target"], "presentation");
    assert_eq!(policy_results[1]["policy"], "signature");
    assert_eq!(policy_results[1]["target"], "credential");
    assert_eq!(policy_results[1]["credentialType"], "VerifiableId");
    assert!(policy_results.iter().all(|r| r["isSuccess"] == true));
}

#[tokio::test]
async fn success_redirect_has_session_id_substituted() {
    let api = api();
    let mut headers = HeaderMap::new();
    headers.insert(
        SUCCESS_REDIRECT_URI_HEADER,
        HeaderValue::from_static("https://portal.example.com/success/$id"),
    );
    headers.insert(
        AUTHORIZE_BASE_URL_HEADER,
        HeaderValue::from_static("haip://authorize"),
    );

    let (state, url) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &headers,
    )
    .await;
    assert!(url.starts_with("haip://authorize?"));

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.body(),
        &format!("https://portal.example.com/success/{state}")
    );
}

#[tokio::test]
async fn failed_specific_policy_is_reported() {
    let api = api();

    let (state, _) = init(
        &api,
        json!({
            "request_credentials": [
                { "credential": "VerifiableId", "policies": ["signature", "expired"] }
            ]
        }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body(),
        "Verification policies did not succeed: expired"
    );

    let status = status(&api, &state).await;
    assert_eq!(status["verificationResult"], false);
    let failed: Vec<_> = status["policyResults"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["isSuccess"] == false)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["policy"], "expired");
    assert_eq!(failed[0]["error"], "expired check failed");
}

#[tokio::test]
async fn error_redirect_replaces_failure_summary() {
    let api = api();
    let mut headers = HeaderMap::new();
    headers.insert(
        ERROR_REDIRECT_URI_HEADER,
        HeaderValue::from_static("https://portal.example.com/error/$id"),
    );

    let (state, _) = init(
        &api,
        json!({ "vc_policies": ["expired"], "request_credentials": ["VerifiableId"] }),
        &headers,
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body(),
        &format!("https://portal.example.com/error/{state}")
    );
}

#[tokio::test]
async fn submission_to_unknown_session() {
    let api = api();

    let response = api.submit("never-created", b"vp_token=abc").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response
        .body()
        .contains("doesn't refer to an existing session, or session expired"));

    assert_eq!(
        api.session("never-created").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn expired_sessions_are_not_found() {
    let api = VerifierApi::new(verifier_with(
        policies(),
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig {
            session_ttl_secs: 0,
            ..Default::default()
        },
    ));

    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(&state, "any", &["VerifiableId"]);
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(matches!(
        api.verifier().describe(&state).await,
        Err(VerifierError::SessionNotFound(_))
    ));
    assert_eq!(
        api.presentation_definition(&state).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn one_input_descriptor_per_distinct_type() {
    let api = api();

    let (state, _) = init(
        &api,
        json!({
            "request_credentials": [
                "VerifiableId",
                { "credential": "OpenBadgeCredential", "policies": ["webhook"] },
                "VerifiableId"
            ]
        }),
        &HeaderMap::new(),
    )
    .await;

    let response = api.presentation_definition(&state).await;
    assert_eq!(response.status(), StatusCode::OK);
    let definition: Json = serde_json::from_str(response.body()).unwrap();
    let ids: Vec<_> = definition["input_descriptors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["VerifiableId", "OpenBadgeCredential"]);

    assert_eq!(
        api.presentation_definition("unknown").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn status_keeps_presentation_definition_across_verifications() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId", "OpenBadgeCredential"] }),
        &HeaderMap::new(),
    )
    .await;

    let before = status(&api, &state).await;
    assert_eq!(before, status(&api, &state).await);
    assert_eq!(before["verificationResult"], Json::Null);
    assert!(before.get("policyResults").is_none());

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId", "OpenBadgeCredential"],
    );
    api.submit(&state, &body).await;

    let after = status(&api, &state).await;
    assert_eq!(
        before["presentationDefinition"],
        after["presentationDefinition"]
    );
    assert_eq!(after["verificationResult"], true);
    assert_eq!(after["policyResults"].as_array().unwrap().len(), 3);
    assert!(after.get("vcPolicies").is_none());
}

#[tokio::test]
async fn undecodable_submission_fails_without_policy_results() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let response = api.submit(&state, b"vp_token=not-a-jwt").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.body(), "Verification failed");
    let status = status(&api, &state).await;
    assert_eq!(status["verificationResult"], false);
    assert_eq!(status["policyResults"], json!([]));
    assert!(status["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to decode token response"));
}

#[tokio::test]
async fn resubmission_overwrites_previous_result() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let first = api.submit(&state, b"garbage").await;
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let second = api.submit(&state, &body).await;
    assert_eq!(second.status(), StatusCode::OK);

    let status = status(&api, &state).await;
    assert_eq!(status["verificationResult"], true);
    assert!(status.get("error").is_none());
}

#[tokio::test]
async fn submissions_to_the_same_session_are_serialized() {
    let concurrency = Arc::new(support::Concurrency::default());
    let policies = policies().with_policy(concurrency.clone()).unwrap();
    let verifier = verifier_with(
        policies,
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig::default(),
    );
    let request = verifier
        .parse_request(&json!({
            "vp_policies": ["concurrency"],
            "vc_policies": [],
            "request_credentials": ["VerifiableId"]
        }))
        .unwrap();
    let session = verifier
        .initialize_session(request, Default::default())
        .await
        .unwrap()
        .session;
    let body = wallet_response(
        &session.id,
        session.presentation_definition.id(),
        &["VerifiableId"],
    );

    let (first, second) = tokio::join!(
        verifier.verify_submission(&session.id, &body),
        verifier.verify_submission(&session.id, &body),
    );

    assert!(first.unwrap().verification_result.as_bool().unwrap());
    assert!(second.unwrap().verification_result.as_bool().unwrap());
    assert_eq!(concurrency.max.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_sessions_verify_concurrently() {
    let policies = policies()
        .with_policy(Arc::new(Rendezvous(Barrier::new(2))))
        .unwrap();
    let verifier = verifier_with(
        policies,
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig::default(),
    );

    let mut submissions = Vec::new();
    for _ in 0..2 {
        let request = verifier
            .parse_request(&json!({
                "vp_policies": ["rendezvous"],
                "request_credentials": ["VerifiableId"]
            }))
            .unwrap();
        let session = verifier
            .initialize_session(request, Default::default())
            .await
            .unwrap()
            .session;
        let body = wallet_response(
            &session.id,
            session.presentation_definition.id(),
            &["VerifiableId"],
        );
        submissions.push((session.id, body));
    }

    // Each verification only completes once the other one is running too.
    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            verifier.verify_submission(&submissions[0].0, &submissions[0].1),
            verifier.verify_submission(&submissions[1].0, &submissions[1].1),
        )
    })
    .await
    .expect("verifications of different sessions blocked each other");

    assert_eq!(first.unwrap().verification_result.as_bool(), Some(true));
    assert_eq!(second.unwrap().verification_result.as_bool(), Some(true));
}

#[tokio::test]
async fn pending_policies_fail_with_timeout() {
    let api = VerifierApi::new(verifier_with(
        policies(),
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig {
            verification_timeout_secs: 1,
            ..Default::default()
        },
    ));
    let (state, _) = init(
        &api,
        json!({ "vp_policies": ["signature", "hang"], "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body(),
        "Verification policies did not succeed: hang"
    );
    let status = status(&api, &state).await;
    let hang = &status["policyResults"][1];
    assert_eq!(hang["policy"], "hang");
    assert_eq!(hang["error"], TIMEOUT_DETAIL);
    assert_eq!(status["policyResults"][0]["isSuccess"], true);
}

#[tokio::test]
async fn malformed_session_requests_are_rejected() {
    let api = api();

    for (body, expected) in [
        (json!({ "request_credentials": [] }), "invalid request_credentials"),
        (
            json!({ "request_credentials": [{ "policies": ["signature"] }] }),
            "missing `credential` name",
        ),
        (
            json!({ "request_credentials": [{ "credential": "VerifiableId" }] }),
            "missing `policies`",
        ),
        (
            json!({ "vc_policies": [{ "args": 1 }], "request_credentials": ["VerifiableId"] }),
            "malformed policy request",
        ),
        (
            json!({ "vc_policies": ["revoked"], "request_credentials": ["VerifiableId"] }),
            "unknown policy `revoked`",
        ),
    ] {
        let response = api
            .verify(&HeaderMap::new(), body.to_string().as_bytes())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            response.body().contains(expected),
            "{:?} does not mention {expected:?}",
            response.body()
        );
    }

    let response = api.verify(&HeaderMap::new(), b"{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut headers = HeaderMap::new();
    headers.insert(RESPONSE_MODE_HEADER, HeaderValue::from_static("post_message"));
    let response = api
        .verify(&headers, br#"{ "request_credentials": ["VerifiableId"] }"#)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.body().contains("post_message"));
}

#[tokio::test]
async fn presentation_definition_by_reference() {
    let api = VerifierApi::new(verifier_with(
        policies(),
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig {
            base_url: "https://verifier.example.com".to_string().try_into().unwrap(),
            presentation_definition_by_reference: true,
            ..Default::default()
        },
    ));

    let (state, url) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let query = query_parameters(&url);
    assert!(!query.contains_key("presentation_definition"));
    assert_eq!(
        query["presentation_definition_uri"],
        format!("https://verifier.example.com/openid4vc/pd/{state}")
    );
}

#[tokio::test]
async fn lost_verification_info_is_an_internal_error() {
    let api = VerifierApi::new(verifier_with(
        policies(),
        Arc::new(ForgetfulStore::default()),
        VerifierServiceConfig::default(),
    ));
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let response = api
        .submit(&state, &wallet_response(&state, "any", &["VerifiableId"]))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn policy_list() {
    let response = api().policy_list();

    assert_eq!(response.status(), StatusCode::OK);
    let policies: Json = serde_json::from_str(response.body()).unwrap();
    assert_eq!(policies["signature"], "Always succeeds");
    assert_eq!(policies["expired"], Json::Null);
    assert_eq!(policies.as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn purge_expired_sessions() {
    let verifier = verifier_with(
        policies(),
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig {
            session_ttl_secs: 0,
            ..Default::default()
        },
    );
    let request = verifier
        .parse_request(&json!({ "request_credentials": ["VerifiableId"] }))
        .unwrap();
    verifier
        .initialize_session(request, Default::default())
        .await
        .unwrap();

    assert_eq!(verifier.purge_expired().await.unwrap(), 1);
    assert_eq!(verifier.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn submission_without_credentials_fails() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(&state, &definition_id(&api, &state).await, &[]);
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.body(), "Verification failed");
    let status = status(&api, &state).await;
    assert_eq!(status["verificationResult"], false);
    assert!(status["error"]
        .as_str()
        .unwrap()
        .contains("no claim submitted for input descriptor `VerifiableId`"));
}

#[tokio::test]
async fn presentation_policy_failure_keeps_credential_outcomes() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({
            "vp_policies": ["signature", "expired"],
            "request_credentials": ["VerifiableId", "OpenBadgeCredential"]
        }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId", "OpenBadgeCredential"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body(),
        "Verification policies did not succeed: expired"
    );

    let status = status(&api, &state).await;
    let outcomes: Vec<_> = status["policyResults"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["policy"].as_str().unwrap(),
                r["target"].as_str().unwrap(),
                r["credentialType"].as_str(),
                r["isSuccess"].as_bool().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        outcomes,
        [
            ("signature", "presentation", None, true),
            ("expired", "presentation", None, false),
            ("signature", "credential", Some("VerifiableId"), true),
            ("signature", "credential", Some("OpenBadgeCredential"), true),
        ]
    );
}

#[tokio::test]
async fn panicking_policy_fails_without_aborting_the_submission() {
    let policies = policies().with_policy(Arc::new(Panics("boom"))).unwrap();
    let api = VerifierApi::new(verifier_with(
        policies,
        Arc::new(MemoryStore::new()),
        VerifierServiceConfig::default(),
    ));
    let (state, _) = init(
        &api,
        json!({ "vc_policies": ["boom", "signature"], "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let submission = {
        let (api, state) = (api.clone(), state.clone());
        tokio::spawn(async move { api.submit(&state, &body).await })
    };
    let response = submission.await.expect("submission task panicked");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body(),
        "Verification policies did not succeed: boom"
    );

    let status = status(&api, &state).await;
    let results = status["policyResults"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1]["policy"], "boom");
    assert_eq!(results[1]["error"], PANIC_DETAIL);
    assert_eq!(results[2]["isSuccess"], true);
}

#[tokio::test]
async fn out_of_range_durations_are_rejected() {
    let build = |config: VerifierServiceConfig| {
        Verifier::builder()
            .with_session_store(Arc::new(MemoryStore::new()))
            .with_policy_executor(Arc::new(policies()))
            .with_config(config)
            .build()
    };

    assert!(build(VerifierServiceConfig {
        verification_timeout_secs: u64::MAX,
        ..Default::default()
    })
    .is_err());
    assert!(build(VerifierServiceConfig {
        session_ttl_secs: u64::MAX,
        ..Default::default()
    })
    .is_err());
    assert!(build(VerifierServiceConfig {
        session_ttl_secs: MAX_SESSION_TTL_SECS,
        ..Default::default()
    })
    .is_ok());
}

#[tokio::test]
async fn decoded_response_parameters_are_verified() {
    let api = api();
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;
    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let parameters = UntypedObject::from_x_www_form_urlencoded(&body).unwrap();

    let result = api
        .verifier()
        .verify_response(&state, parameters)
        .await
        .unwrap();

    assert_eq!(result.verification_result.as_bool(), Some(true));
    assert_eq!(status(&api, &state).await["verificationResult"], true);
    assert!(matches!(
        api.verifier()
            .verify_response("unknown", UntypedObject::default())
            .await,
        Err(VerifierError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn session_ending_during_verification_is_not_found() {
    let api = VerifierApi::new(verifier_with(
        policies(),
        Arc::new(VanishingStore::default()),
        VerifierServiceConfig::default(),
    ));
    let (state, _) = init(
        &api,
        json!({ "request_credentials": ["VerifiableId"] }),
        &HeaderMap::new(),
    )
    .await;

    let body = wallet_response(
        &state,
        &definition_id(&api, &state).await,
        &["VerifiableId"],
    );
    let response = api.submit(&state, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response
        .body()
        .contains("doesn't refer to an existing session, or session expired"));
}
