//! Badge holders as occupants

use tracing::{debug, info};

use super::{EntityMapper, OccupantRef, OccupantReport};
use crate::api::models::BadgeRecord;
use crate::error::Result;
use crate::graph::{Attributes, GraphPlatform};

/// Attribute category holding badge, holder and identifier details
pub const BADGE_CATEGORY: &str = "Badge";

impl<G: GraphPlatform> EntityMapper<G> {
    /// Create or update one occupant per badge holder and index them by
    /// computed identifier.
    ///
    /// Badges without a user are skipped. Badges without an identifier still
    /// attribute their holder but cannot be indexed.
    pub async fn reconcile_occupants(&mut self, badges: &[BadgeRecord]) -> Result<OccupantReport> {
        let mut report = OccupantReport::default();

        for badge in badges {
            let Some(user) = &badge.user else {
                report.skipped += 1;
                continue;
            };

            let occupant = self
                .graph
                .get_or_create_occupant(&self.anchors.occupant_context, &user.id.to_string())
                .await?;

            self.graph
                .set_attributes(&occupant.id, BADGE_CATEGORY, badge_attributes(badge))
                .await?;
            report.attributed += 1;

            match &badge.identifier {
                Some(identifier) => {
                    self.occupants.insert(
                        identifier.computed_identifier.clone(),
                        OccupantRef {
                            node: occupant.id,
                            key: user.id,
                        },
                    );
                    report.indexed += 1;
                }
                None => debug!(badge_id = badge.id, "Badge has no identifier, not indexed"),
            }
        }

        info!(
            attributed = report.attributed,
            indexed = report.indexed,
            skipped = report.skipped,
            "Occupants reconciled"
        );
        Ok(report)
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn flag(value: Option<bool>) -> String {
    value.unwrap_or(false).to_string()
}

/// The flattened `Badge` category for one badge
pub(crate) fn badge_attributes(badge: &BadgeRecord) -> Attributes {
    let user = badge.user.as_ref();
    let identifier = badge.identifier.as_ref();
    let format = identifier.and_then(|i| i.format.as_ref());

    let pairs: [(&str, String); 29] = [
        ("userId", number(user.map(|u| u.id))),
        ("userFirstname", text(&user.and_then(|u| u.firstname.clone()))),
        ("userLastname", text(&user.and_then(|u| u.lastname.clone()))),
        ("userBlocked", flag(user.and_then(|u| u.blocked))),
        ("badgeId", badge.id.to_string()),
        ("badgeUid", text(&badge.uid)),
        ("badgeTechnology", text(&badge.technology)),
        ("badgeOperator", text(&badge.operator)),
        ("badgeMifareProfile", text(&badge.mifare_profile)),
        ("badgeEncodingDate", text(&badge.encoding_date)),
        ("badgeEncodingInfo", text(&badge.encoding_info)),
        ("badgeEncodingCount", number(badge.encoding_count)),
        ("badgeEncodingSize", number(badge.encoding_size)),
        ("badgeCreationDate", text(&badge.creation_date)),
        ("badgeUpdateDate", text(&badge.update_date)),
        ("badgeQuotaReached", flag(badge.quota_reached)),
        ("badgeStatus", text(&badge.status)),
        ("badgeVirtual", number(badge.is_virtual)),
        ("badgeVirtualDesign", text(&badge.virtual_design)),
        ("badgeLabel", text(&badge.label)),
        ("identifierId", number(identifier.and_then(|i| i.id))),
        ("identifierValue", text(&identifier.and_then(|i| i.identifier.clone()))),
        ("identifierIsAttributed", flag(identifier.and_then(|i| i.is_attributed))),
        ("identifierBlocked", flag(identifier.and_then(|i| i.blocked))),
        (
            "identifierComputed",
            identifier.map(|i| i.computed_identifier.clone()).unwrap_or_default(),
        ),
        (
            "identifierType",
            text(&identifier.and_then(|i| i.kind.as_ref()).and_then(|k| k.name.clone())),
        ),
        ("identifierFormatId", number(format.and_then(|f| f.id))),
        ("identifierFormatName", text(&format.and_then(|f| f.name.clone()))),
        ("identifierFormatPattern", text(&format.and_then(|f| f.pattern.clone()))),
    ];

    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
