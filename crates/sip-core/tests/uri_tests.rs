// Integration tests for SIP URI parsing, comparison and building

use std::str::FromStr;

use proptest::prelude::*;
use sipmesh_sip_core::{
    error::Error,
    parser::{SipStyleUriParser, SipUriComponents},
    types::uri::{Scheme, SipUri},
    SipUriBuilder,
};

fn uri(s: &str) -> SipUri {
    SipUri::from_str(s).unwrap_or_else(|e| panic!("failed to parse '{}': {}", s, e))
}

#[test]
fn test_parameter_order_is_irrelevant() {
    assert_eq!(
        uri("sip:a@h;ttl=15;lr;maddr=m;transport=tcp"),
        uri("sip:a@h;transport=tcp;maddr=m;lr;ttl=15"),
        "parameter order must not affect equality"
    );
}

#[test]
fn test_scheme_must_match() {
    assert_ne!(uri("sip:a:p@h"), uri("sips:a:p@h"));
}

#[test]
fn test_unknown_parameter_tolerated_known_parameter_strict() {
    assert_eq!(uri("sip:a@h;x=1"), uri("sip:a@h"));
    assert_eq!(uri("sip:a@h"), uri("sip:a@h;x=1"));
    assert_ne!(uri("sip:a@h;user=x"), uri("sip:a@h"));
    assert_ne!(uri("sip:a@h"), uri("sip:a@h;user=x"));
    for strict in ["ttl=1", "method=INVITE", "maddr=m", "transport=udp"] {
        let with = format!("sip:a@h;{}", strict);
        assert_ne!(uri(&with), uri("sip:a@h"), "{} must match on both sides", strict);
    }
}

#[test]
fn test_time_to_live() {
    assert_eq!(uri("sip:h").time_to_live().unwrap(), 0);
    assert_eq!(uri("sip:h;ttl=255").time_to_live().unwrap(), 255);
    match SipUri::from_str("sip:h;ttl=256") {
        Err(Error::OutOfRange { component, value, .. }) => {
            assert_eq!(component, "ttl");
            assert_eq!(value, 256);
        }
        other => panic!("expected OutOfRange, got {:?}", other),
    }
}

#[test]
fn test_rfc3261_comparison_examples() {
    // Section 19.1.4 equivalent pairs
    assert_eq!(uri("sip:%61lice@atlanta.com;transport=TCP"), uri("sip:alice@AtLanTa.CoM;Transport=tcp"));
    assert_eq!(uri("sip:carol@chicago.com"), uri("sip:carol@chicago.com;newparam=5"));
    assert_eq!(
        uri("sip:biloxi.com;transport=tcp;method=REGISTER?to=sip:bob%40biloxi.com"),
        uri("sip:biloxi.com;method=REGISTER;transport=tcp?to=sip:bob%40biloxi.com")
    );
    assert_eq!(
        uri("sip:alice@atlanta.com?subject=project%20x&priority=urgent"),
        uri("sip:alice@atlanta.com?priority=urgent&subject=project%20x")
    );

    // Section 19.1.4 non-equivalent pairs
    assert_ne!(uri("SIP:ALICE@AtLanTa.CoM;Transport=udp"), uri("sip:alice@AtLanTa.CoM;Transport=UDP"));
    assert_ne!(uri("sip:bob@biloxi.com"), uri("sip:bob@biloxi.com:5060"));
    assert_ne!(uri("sip:bob@biloxi.com"), uri("sip:bob@biloxi.com;transport=udp"));
    assert_ne!(uri("sip:carol@chicago.com"), uri("sip:carol@chicago.com?Subject=next%20meeting"));
}

#[test]
fn test_scheme_accessor() {
    assert_eq!(uri("SIPS:h").scheme(), Scheme::Sips);
    assert!(SipUri::from_str("mailto:a@h").is_err());
}

#[test]
fn test_extractor_and_uri_agree() {
    let raw = "sip:alice:pw@[::1]:5070;maddr=10.0.0.1;lr?subject=a%20b";
    let parser = SipStyleUriParser::new();
    let u = uri(raw);
    for component in [
        SipUriComponents::SCHEME,
        SipUriComponents::USER_NAME,
        SipUriComponents::PASSWORD,
        SipUriComponents::HOST,
        SipUriComponents::PORT,
        SipUriComponents::PARAMETERS,
        SipUriComponents::HEADERS,
        SipUriComponents::MADDR,
        SipUriComponents::LR,
        SipUriComponents::HOST_PORT,
        SipUriComponents::STRONG_AUTHORITY,
    ] {
        assert_eq!(parser.get_component(raw, component), u.component(component));
    }
    assert_eq!(u.component(SipUriComponents::HEADERS), "?subject=a b");
}

#[test]
fn test_builder_ttl_transport_consistency() {
    let mut builder = SipUriBuilder::from_str("sip:h;transport=tcp").unwrap();
    assert!(matches!(builder.set_time_to_live(1), Err(Error::TtlRequiresUdp(_))));

    let mut builder = SipUriBuilder::from_str("sip:h;ttl=1").unwrap();
    assert!(matches!(builder.set_transport("tcp"), Err(Error::TtlRequiresUdp(_))));

    assert!(SipUriBuilder::from_str("sip:h;ttl=1;transport=tcp").is_err());
}

proptest! {
    #[test]
    fn builder_round_trip_is_idempotent(
        user in "[a-z][a-z0-9]{0,7}",
        password in proptest::option::of("[a-z0-9]{1,6}"),
        host in "[a-z]{1,10}\\.(com|org|net)",
        port in proptest::option::of(1024u16..5000),
        secure in any::<bool>(),
        transport in proptest::option::of(prop_oneof![Just("tcp"), Just("udp"), Just("tls")]),
        lr in any::<bool>(),
    ) {
        let mut raw = format!("{}:{}", if secure { "sips" } else { "sip" }, user);
        if let Some(password) = &password {
            raw.push(':');
            raw.push_str(password);
        }
        raw.push('@');
        raw.push_str(&host);
        if let Some(port) = port {
            raw.push_str(&format!(":{}", port));
        }
        if let Some(transport) = transport {
            raw.push_str(&format!(";transport={}", transport));
        }
        if lr {
            raw.push_str(";lr");
        }

        let parsed = SipUri::from_str(&raw).unwrap();
        let mut builder = SipUriBuilder::from_uri(&parsed).unwrap();
        let built = builder.build();
        prop_assert_eq!(&built, &raw);

        let mut again = SipUriBuilder::from_str(&built).unwrap();
        prop_assert_eq!(again.build(), built);
        prop_assert_eq!(builder.uri().unwrap(), parsed);
    }
}
