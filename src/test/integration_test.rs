use std::time::Duration;

use crate::security::auth::AuthService;
use crate::security::password::PasswordHasherService;
use crate::security::rate_limiter::RateLimiter;

#[test]
fn registration_then_login_round_trip() {
    let hashed = PasswordHasherService::hash("correct horse battery staple").unwrap();
    assert!(PasswordHasherService::verify("correct horse battery staple", &hashed).unwrap());
    assert!(!PasswordHasherService::verify("wrong password", &hashed).unwrap());

    let auth = AuthService::new("integration-test-secret", 30);
    let (token, _exp) = auth.issue_token(&"user-42".to_string()).unwrap();
    let claims = auth.verify_token(&token).unwrap();
    assert_eq!(claims.sub, "user-42");
}

#[test]
fn login_attempts_are_rate_limited_independent_of_registration() {
    let login_limiter = RateLimiter::new(3, Duration::from_secs(60));
    let register_limiter = RateLimiter::new(1, Duration::from_secs(3600));

    for _ in 0..3 {
        login_limiter.check("203.0.113.9").expect("under login capacity");
    }
    assert!(login_limiter.check("203.0.113.9").is_err());

    // A different client on the same limiter still has its own bucket.
    login_limiter.check("203.0.113.10").expect("fresh client unaffected");

    // The register limiter is a distinct bucket set entirely.
    register_limiter.check("203.0.113.9").expect("register bucket independent of login bucket");
    assert!(register_limiter.check("203.0.113.9").is_err());
}
