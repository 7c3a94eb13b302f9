use super::*;

#[test]
fn test_tls_mode_parses_postgres_spellings() {
    assert_eq!("disable".parse::<TlsMode>().unwrap(), TlsMode::Disable);
    assert_eq!("allow".parse::<TlsMode>().unwrap(), TlsMode::Allow);
    assert_eq!("Prefer".parse::<TlsMode>().unwrap(), TlsMode::Prefer);
    assert_eq!("require".parse::<TlsMode>().unwrap(), TlsMode::Require);
    assert_eq!("verify-ca".parse::<TlsMode>().unwrap(), TlsMode::VerifyCa);
    assert_eq!("verify_full".parse::<TlsMode>().unwrap(), TlsMode::VerifyFull);
}

#[test]
fn test_tls_mode_rejects_unknown() {
    let err = "sometimes".parse::<TlsMode>().unwrap_err();
    assert!(err.to_string().contains("unknown SSL mode 'sometimes'"));
}

#[test]
fn test_tls_mode_round_trips_through_display() {
    for mode in [
        TlsMode::Disable,
        TlsMode::Allow,
        TlsMode::Prefer,
        TlsMode::Require,
        TlsMode::VerifyCa,
        TlsMode::VerifyFull,
    ] {
        assert_eq!(mode.to_string().parse::<TlsMode>().unwrap(), mode);
    }
}

#[test]
fn test_tls_mode_default_is_prefer() {
    assert_eq!(TlsMode::default(), TlsMode::Prefer);
    assert!(!TlsMode::Prefer.requires_encryption());
    assert!(TlsMode::Require.requires_encryption());
    assert!(!TlsMode::Require.requires_ca_verification());
    assert!(TlsMode::VerifyCa.requires_ca_verification());
    assert!(!TlsMode::VerifyCa.requires_hostname_verification());
    assert!(TlsMode::VerifyFull.requires_hostname_verification());
}

#[test]
fn test_tls_config_validate_client_pair() {
    let ok = TlsConfig::new(TlsMode::VerifyFull)
        .ca_cert("/etc/ssl/root.crt")
        .client_cert("/etc/ssl/client.crt", "/etc/ssl/client.key");
    assert!(ok.validate().is_ok());

    let mut missing_key = ok.clone();
    missing_key.client_key = None;
    assert!(missing_key.validate().is_err());

    let mut missing_cert = ok;
    missing_cert.client_cert = None;
    assert!(missing_cert.validate().is_err());
}

#[test]
fn test_tls_config_rejects_empty_paths() {
    let config = TlsConfig::new(TlsMode::Require).ca_cert("");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("CA certificate path cannot be empty"));
}
