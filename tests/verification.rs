//! Credential verification against pool allow-lists

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use perimeter::common::{days, InMemoryAssetLedger};
use perimeter::{
    Account, AssetId, AttestationSignature, Deployment, ErrorKind, Pool, PoolRequest,
    ProtocolConfig, Timestamp, VerificationResult,
};
use rust_decimal::Decimal;

const NOW: Timestamp = 1_704_067_200;
const SCHEMA: &str = "kyc/v1";

fn deploy() -> (Deployment, Account) {
    let operator = Account::derive("verification", b"operator");
    let admin = Account::derive("verification", b"admin");
    let deployment = Deployment::new(
        operator,
        ProtocolConfig::default(),
        Arc::new(InMemoryAssetLedger::new()),
    )
    .unwrap();
    deployment
        .services
        .set_liquidity_asset(&operator, AssetId::new("USDC").unwrap(), true)
        .unwrap();
    deployment
        .terms
        .accept_terms_of_service(&admin, NOW)
        .unwrap();
    deployment
        .pool_admins
        .allow_participant(&operator, admin, NOW)
        .unwrap();
    (deployment, admin)
}

fn pool_trusting(deployment: &Deployment, admin: &Account, verifier: &SigningKey) -> Arc<Pool> {
    let request = PoolRequest::new(AssetId::new("USDC").unwrap(), Decimal::ZERO, NOW + days(30));
    let pool_id = deployment.pools.create_pool(admin, request, NOW).unwrap().pool_id;
    let pool = deployment.pool(&pool_id).unwrap();
    pool.participants().add_credential_schema(admin, SCHEMA).unwrap();
    pool.participants()
        .add_trusted_verifier(admin, Account::from_verifying_key(&verifier.verifying_key()))
        .unwrap();
    pool
}

fn attest(
    pool: &Pool,
    key: &SigningKey,
    subject: Account,
    id: &str,
) -> (VerificationResult, AttestationSignature) {
    let result = VerificationResult::new(SCHEMA, subject, NOW + days(90), id);
    let signature = AttestationSignature::sign(&result, &pool.participants().scope(), key);
    (result, signature)
}

#[test]
fn test_verified_subject_is_allowed() {
    let (deployment, admin) = deploy();
    let (verifier, key) = Account::generate();
    let pool = pool_trusting(&deployment, &admin, &key);
    let subject = Account::derive("verification", b"subject");

    let (result, signature) = attest(&pool, &key, subject, "v-1");
    let receipt = pool.participants().verify(&result, &signature, NOW).unwrap();

    assert_eq!(receipt.verifier, verifier);
    assert!(pool.participants().is_allowed(&subject));
}

#[test]
fn test_replayed_verification_is_rejected() {
    let (deployment, admin) = deploy();
    let (_, key) = Account::generate();
    let pool = pool_trusting(&deployment, &admin, &key);
    let subject = Account::derive("verification", b"subject");

    let (result, signature) = attest(&pool, &key, subject, "v-1");
    pool.participants().verify(&result, &signature, NOW).unwrap();

    let err = pool
        .participants()
        .verify(&result, &signature, NOW + 60)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReplayedVerification);
}

#[test]
fn test_rejections_leave_subject_disallowed() {
    let (deployment, admin) = deploy();
    let (_, key) = Account::generate();
    let (_, stranger_key) = Account::generate();
    let pool = pool_trusting(&deployment, &admin, &key);
    let subject = Account::derive("verification", b"subject");
    let participants = pool.participants();

    let (result, signature) = attest(&pool, &stranger_key, subject, "v-untrusted");
    assert_eq!(
        participants.verify(&result, &signature, NOW).unwrap_err().kind(),
        ErrorKind::UntrustedVerifier
    );

    let mut result = VerificationResult::new("aml/v2", subject, NOW + days(90), "v-schema");
    let signature = AttestationSignature::sign(&result, &participants.scope(), &key);
    assert_eq!(
        participants.verify(&result, &signature, NOW).unwrap_err().kind(),
        ErrorKind::UnknownSchema
    );

    result.schema = SCHEMA.to_string();
    assert_eq!(
        participants.verify(&result, &signature, NOW).unwrap_err().kind(),
        ErrorKind::InvalidSignature
    );

    let (result, signature) = attest(&pool, &key, subject, "v-late");
    assert_eq!(
        participants
            .verify(&result, &signature, result.expiration)
            .unwrap_err()
            .kind(),
        ErrorKind::Expired
    );

    assert!(!participants.is_allowed(&subject));
}

#[test]
fn test_attestation_is_bound_to_one_pool() {
    let (deployment, admin) = deploy();
    let (_, key) = Account::generate();
    let first = pool_trusting(&deployment, &admin, &key);
    let second = pool_trusting(&deployment, &admin, &key);
    let subject = Account::derive("verification", b"subject");

    let (result, signature) = attest(&first, &key, subject, "v-1");
    let err = second
        .participants()
        .verify(&result, &signature, NOW)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    assert!(!second.participants().is_allowed(&subject));
}

#[test]
fn test_removing_verifier_stops_new_admissions() {
    let (deployment, admin) = deploy();
    let (verifier, key) = Account::generate();
    let pool = pool_trusting(&deployment, &admin, &key);
    let early = Account::derive("verification", b"early");
    let late = Account::derive("verification", b"late");

    let (result, signature) = attest(&pool, &key, early, "v-early");
    pool.participants().verify(&result, &signature, NOW).unwrap();

    pool.participants()
        .remove_trusted_verifier(&admin, &verifier)
        .unwrap();

    let (result, signature) = attest(&pool, &key, late, "v-late");
    assert_eq!(
        pool.participants()
            .verify(&result, &signature, NOW)
            .unwrap_err()
            .kind(),
        ErrorKind::UntrustedVerifier
    );
    // Existing admissions stand
    assert!(pool.participants().is_allowed(&early));
}
