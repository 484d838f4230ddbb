// ============================================================================
// Instance Resolver
// ============================================================================
//
// Maps a caller-supplied "from" reference to one of the API key's authorized
// backend instances. A key claimed by an organization may address any of the
// organization's instances; the reference is either a phone number (in any
// human formatting) or an instance id.
//
// ============================================================================

use serde::{Deserialize, Serialize};

/// One WhatsApp session/credential pair an API key may act through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedInstance {
    pub id: String,
    /// Backend session identifier, `<digits>[:<device>]@<domain>`.
    /// Null while the instance has no connected WhatsApp session.
    pub whatsapp_jid: Option<String>,
    pub provider_token: String,
}

/// Resolve `from` against the key's instance set.
///
/// Phone match strictly takes priority over id match, even when an id string
/// happens to look like the same digits; ids are compared untouched because
/// they are not phone-shaped.
pub fn resolve_instance<'a>(
    from: &str,
    allowed_instances: &'a [AllowedInstance],
) -> Option<&'a AllowedInstance> {
    if from.is_empty() || allowed_instances.is_empty() {
        return None;
    }

    let normalized_from: String = from.chars().filter(|c| c.is_ascii_digit()).collect();

    if !normalized_from.is_empty() {
        let by_phone = allowed_instances.iter().find(|inst| {
            inst.whatsapp_jid
                .as_deref()
                .is_some_and(|jid| jid_phone(jid) == normalized_from)
        });
        if by_phone.is_some() {
            return by_phone;
        }
    }

    allowed_instances.iter().find(|inst| inst.id == from)
}

/// Extract the phone component of a JID: the part before `@`, then before
/// the `:<device>` suffix multi-device sessions carry.
fn jid_phone(jid: &str) -> &str {
    let before_at = match jid.find('@') {
        Some(idx) if idx > 0 => &jid[..idx],
        _ => jid,
    };
    match before_at.find(':') {
        Some(idx) if idx > 0 => &before_at[..idx],
        _ => before_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<AllowedInstance> {
        vec![
            AllowedInstance {
                id: "uuid-1".into(),
                whatsapp_jid: Some("5585912345678@s.whatsapp.net".into()),
                provider_token: "token1".into(),
            },
            AllowedInstance {
                id: "uuid-2".into(),
                whatsapp_jid: Some("5511987654321@s.whatsapp.net".into()),
                provider_token: "token2".into(),
            },
            AllowedInstance {
                id: "uuid-3".into(),
                whatsapp_jid: None,
                provider_token: "token3".into(),
            },
        ]
    }

    #[test]
    fn resolves_by_exact_phone() {
        let all = instances();
        let result = resolve_instance("5585912345678", &all).unwrap();
        assert_eq!(result.id, "uuid-1");
        assert_eq!(result.provider_token, "token1");

        let result = resolve_instance("5511987654321", &all).unwrap();
        assert_eq!(result.id, "uuid-2");
    }

    #[test]
    fn resolves_phone_with_formatting_characters() {
        let all = instances();
        assert_eq!(
            resolve_instance("+55 85 91234-5678", &all).unwrap().id,
            "uuid-1"
        );
        assert_eq!(
            resolve_instance("+55 (85) 91234-5678", &all).unwrap().id,
            "uuid-1"
        );
    }

    #[test]
    fn resolves_by_instance_id() {
        let all = instances();
        let result = resolve_instance("uuid-2", &all).unwrap();
        assert_eq!(result.provider_token, "token2");

        // Instance without a connected session is only reachable by id
        let result = resolve_instance("uuid-3", &all).unwrap();
        assert_eq!(result.provider_token, "token3");
    }

    #[test]
    fn returns_none_when_unmatched() {
        let all = instances();
        assert!(resolve_instance("5500000000000", &all).is_none());
        assert!(resolve_instance("uuid-unknown", &all).is_none());
        assert!(resolve_instance("", &all).is_none());
        assert!(resolve_instance("5585912345678", &[]).is_none());
    }

    #[test]
    fn phone_match_wins_over_phone_shaped_id() {
        let all = vec![
            AllowedInstance {
                id: "5585912345678".into(),
                whatsapp_jid: Some("5511111111111@s.whatsapp.net".into()),
                provider_token: "token-a".into(),
            },
            AllowedInstance {
                id: "uuid-b".into(),
                whatsapp_jid: Some("5585912345678@s.whatsapp.net".into()),
                provider_token: "token-b".into(),
            },
        ];
        assert_eq!(resolve_instance("5585912345678", &all).unwrap().id, "uuid-b");
    }

    #[test]
    fn handles_device_suffix_and_bare_jid() {
        let all = vec![AllowedInstance {
            id: "uuid-1".into(),
            whatsapp_jid: Some("5585912345678:23@s.whatsapp.net".into()),
            provider_token: "token1".into(),
        }];
        assert_eq!(resolve_instance("5585912345678", &all).unwrap().id, "uuid-1");

        let bare = vec![AllowedInstance {
            id: "uuid-1".into(),
            whatsapp_jid: Some("5585912345678".into()),
            provider_token: "token1".into(),
        }];
        assert_eq!(resolve_instance("5585912345678", &bare).unwrap().id, "uuid-1");
    }
}
