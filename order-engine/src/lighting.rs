//! Map-lighting pipeline
//!
//! Runs inside the confirmation unit of work, so the reward, the footprint
//! update, and any title promotion land atomically with the escrow release.
//! Callers must hold the row lock for the canonical buyer-seller-province
//! pair before invoking [`apply`].

use crate::titles;
use crate::types::LightingOutcome;
use market_core::{
    Account, AccountId, AuditEvent, AuditKind, Footprint, OrderId, PairKey, PairLock, Province,
    Result, Storage, Title, UnitOfWork,
};
use chrono::{DateTime, Utc};

/// Apply the lighting reward for one confirmed order.
///
/// The buyer-seller-province pair rewards at most once, ever. A repeat pair
/// returns an inert outcome without touching the buyer. Otherwise the buyer's
/// footprint for the province is created or incremented, a first-time light
/// bumps `provinces_lit`, and the title catalog is consulted for a promotion.
///
/// Mutates `buyer` in place; the caller stages and commits it as part of the
/// surrounding unit of work.
#[allow(clippy::too_many_arguments)]
pub fn apply(
    storage: &Storage,
    unit: &mut UnitOfWork<'_>,
    buyer: &mut Account,
    seller: AccountId,
    province: &Province,
    order_id: OrderId,
    titles: &[Title],
    now: DateTime<Utc>,
) -> Result<LightingOutcome> {
    let pair = PairKey::canonical(buyer.account_id, seller, province.clone());

    let mut lock = match storage.find_pair_lock(&pair)? {
        Some(existing) if existing.rewarded => {
            tracing::debug!(
                buyer = %buyer.account_id,
                %seller,
                province = %province,
                "Pair already rewarded, skipping lighting"
            );
            return Ok(LightingOutcome::default());
        }
        Some(existing) => existing,
        None => PairLock::new(&pair, now),
    };
    lock.mark_rewarded(order_id, now)?;
    unit.stage_pair_lock(&lock)?;

    let (footprint, newly_lit) = match storage.find_footprint(&buyer.account_id, province)? {
        Some(mut existing) => {
            let newly_lit = existing.record_reward(now);
            (existing, newly_lit)
        }
        None => (Footprint::first(buyer.account_id, province.clone(), now), true),
    };
    unit.stage_footprint(&footprint)?;
    unit.stage_audit(&AuditEvent::for_order(
        order_id,
        AuditKind::ProvinceLit {
            account: buyer.account_id,
            province: province.clone(),
            first_time: newly_lit,
        },
        now,
    ))?;

    let mut promoted_to = None;
    if newly_lit {
        buyer.provinces_lit += 1;
        buyer.updated_at = now;

        if let Some(title) = titles::qualifying_title(titles, buyer.provinces_lit) {
            if title.level > buyer.title_level {
                buyer.title_level = title.level;
                promoted_to = Some(title.level);
                unit.stage_audit(&AuditEvent::for_order(
                    order_id,
                    AuditKind::TitlePromoted {
                        account: buyer.account_id,
                        level: title.level,
                    },
                    now,
                ))?;
                tracing::info!(
                    buyer = %buyer.account_id,
                    level = title.level,
                    title = %title.name,
                    provinces_lit = buyer.provinces_lit,
                    "Buyer promoted"
                );
            }
        }
        unit.stage_account(buyer)?;
    }

    Ok(LightingOutcome {
        rewarded: true,
        newly_lit,
        promoted_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::Config;
    use tempfile::TempDir;

    fn open_storage(dir: &TempDir) -> Storage {
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        Storage::open(&config).unwrap()
    }

    fn title(level: u8, name: &str, required: u32) -> Title {
        Title {
            level,
            name: name.to_string(),
            required_provinces: required,
        }
    }

    fn seed_account(storage: &Storage, name: &str) -> Account {
        let account = Account::new(name, None, Utc::now());
        let mut unit = storage.begin_unit();
        unit.stage_account(&account).unwrap();
        unit.commit().unwrap();
        account
    }

    fn apply_once(
        storage: &Storage,
        buyer: &mut Account,
        seller: AccountId,
        province: &Province,
        titles: &[Title],
    ) -> LightingOutcome {
        let mut unit = storage.begin_unit();
        let outcome = apply(
            storage,
            &mut unit,
            buyer,
            seller,
            province,
            OrderId::generate(),
            titles,
            Utc::now(),
        )
        .unwrap();
        unit.commit().unwrap();
        outcome
    }

    #[test]
    fn test_first_reward_lights_province() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut buyer = seed_account(&storage, "buyer");
        let seller = seed_account(&storage, "seller");
        let province = Province::new("Yunnan").unwrap();

        let outcome = apply_once(&storage, &mut buyer, seller.account_id, &province, &[]);
        assert!(outcome.rewarded);
        assert!(outcome.newly_lit);
        assert_eq!(buyer.provinces_lit, 1);

        let stored = storage.get_account(&buyer.account_id).unwrap();
        assert_eq!(stored.provinces_lit, 1);
        let footprint = storage
            .find_footprint(&buyer.account_id, &province)
            .unwrap()
            .unwrap();
        assert!(footprint.lit);
        assert_eq!(footprint.lit_count, 1);
    }

    #[test]
    fn test_repeat_pair_is_inert() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut buyer = seed_account(&storage, "buyer");
        let seller = seed_account(&storage, "seller");
        let province = Province::new("Yunnan").unwrap();

        let first = apply_once(&storage, &mut buyer, seller.account_id, &province, &[]);
        assert!(first.rewarded);

        let second = apply_once(&storage, &mut buyer, seller.account_id, &province, &[]);
        assert!(!second.rewarded);
        assert!(!second.newly_lit);
        assert_eq!(buyer.provinces_lit, 1);

        let footprint = storage
            .find_footprint(&buyer.account_id, &province)
            .unwrap()
            .unwrap();
        assert_eq!(footprint.lit_count, 1);
    }

    #[test]
    fn test_new_seller_same_province_counts_without_relighting() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut buyer = seed_account(&storage, "buyer");
        let seller_a = seed_account(&storage, "seller-a");
        let seller_b = seed_account(&storage, "seller-b");
        let province = Province::new("Yunnan").unwrap();

        apply_once(&storage, &mut buyer, seller_a.account_id, &province, &[]);
        let second = apply_once(&storage, &mut buyer, seller_b.account_id, &province, &[]);

        assert!(second.rewarded);
        assert!(!second.newly_lit);
        assert_eq!(buyer.provinces_lit, 1);

        let footprint = storage
            .find_footprint(&buyer.account_id, &province)
            .unwrap()
            .unwrap();
        assert_eq!(footprint.lit_count, 2);
    }

    #[test]
    fn test_promotion_at_threshold() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut buyer = seed_account(&storage, "buyer");
        let titles = vec![title(1, "Wanderer", 1), title(2, "Voyager", 2)];

        let sellers: Vec<_> = (0..2)
            .map(|i| seed_account(&storage, format!("seller-{}", i).as_str()))
            .collect();

        let first = apply_once(
            &storage,
            &mut buyer,
            sellers[0].account_id,
            &Province::new("Yunnan").unwrap(),
            &titles,
        );
        // Level 1 qualifies but matches the starting level, so no promotion
        assert!(first.promoted_to.is_none());
        assert_eq!(buyer.title_level, 1);

        let second = apply_once(
            &storage,
            &mut buyer,
            sellers[1].account_id,
            &Province::new("Tibet").unwrap(),
            &titles,
        );
        assert_eq!(second.promoted_to, Some(2));
        assert_eq!(buyer.title_level, 2);

        let stored = storage.get_account(&buyer.account_id).unwrap();
        assert_eq!(stored.title_level, 2);
    }

    #[test]
    fn test_pair_symmetry_blocks_reverse_direction() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(&dir);
        let mut alice = seed_account(&storage, "alice");
        let mut bob = seed_account(&storage, "bob");
        let province = Province::new("Hainan").unwrap();

        let forward = apply_once(&storage, &mut alice, bob.account_id, &province, &[]);
        assert!(forward.rewarded);

        // Same two accounts with roles swapped hit the same canonical pair
        let reverse = apply_once(&storage, &mut bob, alice.account_id, &province, &[]);
        assert!(!reverse.rewarded);
        assert_eq!(bob.provinces_lit, 0);
    }
}
