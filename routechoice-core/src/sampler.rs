//! Scenario sampling: subset selection, ordering, pool resolution and preselection.
//!
//! Every random decision is drawn from a [`SamplerRng`], which splits one
//! user-visible seed into independent streams so that, for example, changing
//! how many alternatives a scenario has does not perturb which scenarios are
//! selected.
use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::Sha256;
use thiserror::Error;

use crate::constants::{STREAM_ORDER, STREAM_POOLS, STREAM_PRESELECT, STREAM_SUBSET};
use crate::pool::{EmptyPool, ValuePool};
use crate::scenario::{
    AlternativeRouteInstance, AlternativeRouteTemplate, ScenarioInstance, ScenarioPool,
    ScenarioPoolEntry, Settings,
};

/// Independent random streams for each sampling stage.
#[derive(Debug, Clone)]
pub struct SamplerRng {
    seed: u64,
    subset: ChaCha8Rng,
    order: ChaCha8Rng,
    pools: ChaCha8Rng,
    preselect: ChaCha8Rng,
}

impl SamplerRng {
    /// Construct the streams from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            seed,
            subset: ChaCha8Rng::seed_from_u64(derive_stream_seed(seed, STREAM_SUBSET)),
            order: ChaCha8Rng::seed_from_u64(derive_stream_seed(seed, STREAM_ORDER)),
            pools: ChaCha8Rng::seed_from_u64(derive_stream_seed(seed, STREAM_POOLS)),
            preselect: ChaCha8Rng::seed_from_u64(derive_stream_seed(seed, STREAM_PRESELECT)),
        }
    }

    /// Seed the streams from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::from_user_seed(rand::random())
    }

    /// Seed this bundle was built from, for reproducing a page load.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes())
        .expect("HMAC accepts any key length");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// A pool that turned out empty while resolving a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scenario `{scenario}` has an empty `{field}` pool")]
pub struct SampleError {
    pub scenario: String,
    pub field: String,
}

/// Choose `n` of `len` indices in a single pass, preserving order.
///
/// At position `i` with `remaining = len - i` candidates left and `to_select`
/// still needed, the index is kept with probability `to_select / remaining`.
/// Every index is equally likely to be chosen and exactly `min(n, len)` are.
pub fn select_subset<R: Rng + ?Sized>(len: usize, n: usize, rng: &mut R) -> Vec<usize> {
    let mut to_select = n.min(len);
    let mut selected = Vec::with_capacity(to_select);
    for index in 0..len {
        if to_select == 0 {
            break;
        }
        let remaining = len - index;
        if rng.gen_range(0..remaining) < to_select {
            selected.push(index);
            to_select -= 1;
        }
    }
    selected
}

/// Sample the scenarios a participant sees on one page load.
///
/// # Errors
///
/// Returns [`SampleError`] when a selected scenario carries an empty pool.
pub fn sample(
    pool: &ScenarioPool,
    settings: &Settings,
    rng: &mut SamplerRng,
) -> Result<Vec<ScenarioInstance>, SampleError> {
    let entries: Vec<(&str, &ScenarioPoolEntry)> = pool.iter().collect();
    let count = settings.effective_count(entries.len());
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut chosen: Vec<(&str, &ScenarioPoolEntry)> =
        select_subset(entries.len(), count, &mut rng.subset)
            .into_iter()
            .map(|index| entries[index])
            .collect();
    if settings.scenario_shuffle {
        chosen.shuffle(&mut rng.order);
    }

    chosen
        .into_iter()
        .map(|(key, entry)| instantiate(key, entry, rng))
        .collect()
}

/// Resolve one template into a concrete scenario.
///
/// # Errors
///
/// Returns [`SampleError`] when any pool on the template is empty.
pub fn instantiate(
    key: &str,
    entry: &ScenarioPoolEntry,
    rng: &mut SamplerRng,
) -> Result<ScenarioInstance, SampleError> {
    let fail = |field: &str| SampleError {
        scenario: key.to_string(),
        field: field.to_string(),
    };
    let pools = &mut rng.pools;

    let start = *entry.start.resolve(pools).map_err(|EmptyPool| fail("start"))?;
    let end = *entry.end.resolve(pools).map_err(|EmptyPool| fail("end"))?;
    let default_route_time = *entry
        .default_route_time
        .resolve(pools)
        .map_err(|EmptyPool| fail("default_route_time"))?;
    let scenario_name = resolve_text(entry.scenario_name.as_ref(), pools)
        .map_err(|EmptyPool| fail("scenario_name"))?;
    let value_name =
        resolve_text(entry.value_name.as_ref(), pools).map_err(|EmptyPool| fail("value_name"))?;
    let description =
        resolve_text(entry.description.as_ref(), pools).map_err(|EmptyPool| fail("description"))?;

    let mut choice_list = entry
        .choice_list
        .iter()
        .enumerate()
        .map(|(index, alt)| {
            resolve_alternative(alt, pools)
                .map_err(|field| fail(&format!("choice_list[{index}].{field}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    resolve_preselection(
        key,
        &mut choice_list,
        entry.randomly_preselect_route,
        &mut rng.preselect,
    );

    Ok(ScenarioInstance {
        id: key.to_string(),
        start,
        end,
        default_route_time,
        scenario_name,
        value_name,
        description,
        choice_list,
    })
}

fn resolve_text<R: Rng + ?Sized>(
    field: Option<&ValuePool<String>>,
    rng: &mut R,
) -> Result<Option<String>, EmptyPool> {
    field.map(|pool| pool.resolve(rng).cloned()).transpose()
}

fn resolve_alternative<R: Rng + ?Sized>(
    alt: &AlternativeRouteTemplate,
    rng: &mut R,
) -> Result<AlternativeRouteInstance, &'static str> {
    Ok(AlternativeRouteInstance {
        middle_point: *alt.middle_point.resolve(rng).map_err(|EmptyPool| "middle_point")?,
        tts: *alt.tts.resolve(rng).map_err(|EmptyPool| "tts")?,
        value_name: resolve_text(alt.value_name.as_ref(), rng).map_err(|EmptyPool| "value_name")?,
        description: resolve_text(alt.description.as_ref(), rng)
            .map_err(|EmptyPool| "description")?,
        preselected: alt.preselected,
    })
}

/// Leave exactly one alternative preselected.
///
/// Random preselection overrides stored flags. Otherwise the first stored flag
/// wins, and with no flag set the first alternative is forced on.
pub fn resolve_preselection<R: Rng + ?Sized>(
    scenario: &str,
    choice_list: &mut [AlternativeRouteInstance],
    randomly_preselect: bool,
    rng: &mut R,
) {
    if choice_list.is_empty() {
        return;
    }

    let winner = if randomly_preselect {
        rng.gen_range(0..choice_list.len())
    } else if let Some(first) = choice_list.iter().position(|alt| alt.preselected) {
        first
    } else {
        log::warn!(
            "scenario `{scenario}` has no preselected alternative; preselecting the first one"
        );
        0
    };

    for (index, alt) in choice_list.iter_mut().enumerate() {
        alt.preselected = index == winner;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use rand::rngs::mock::StepRng;

    fn alternative(preselected: bool) -> AlternativeRouteInstance {
        AlternativeRouteInstance {
            middle_point: LatLng::new(45.0, -75.0),
            tts: 5,
            value_name: None,
            description: None,
            preselected,
        }
    }

    #[test]
    fn subset_takes_everything_when_n_equals_len() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(select_subset(5, 5, &mut rng), vec![0, 1, 2, 3, 4]);
        assert_eq!(select_subset(3, 10, &mut rng), vec![0, 1, 2]);
        assert!(select_subset(4, 0, &mut rng).is_empty());
        assert!(select_subset(0, 2, &mut rng).is_empty());
    }

    #[test]
    fn subset_is_sorted_and_exact() {
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let picked = select_subset(9, 4, &mut rng);
            assert_eq!(picked.len(), 4);
            assert!(picked.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn first_stored_flag_wins() {
        let mut list = vec![alternative(false), alternative(true), alternative(true)];
        resolve_preselection("s", &mut list, false, &mut StepRng::new(0, 1));
        let flags: Vec<bool> = list.iter().map(|alt| alt.preselected).collect();
        assert_eq!(flags, [false, true, false]);
    }

    #[test]
    fn missing_flag_forces_first_alternative() {
        let mut list = vec![alternative(false), alternative(false)];
        resolve_preselection("s", &mut list, false, &mut StepRng::new(0, 1));
        assert!(list[0].preselected);
        assert!(!list[1].preselected);
    }

    #[test]
    fn random_preselection_overrides_stored_flags() {
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut list = vec![alternative(true), alternative(true), alternative(true)];
            resolve_preselection("s", &mut list, true, &mut rng);
            assert_eq!(list.iter().filter(|alt| alt.preselected).count(), 1);
        }
    }

    #[test]
    fn stream_seeds_are_domain_separated() {
        assert_ne!(
            derive_stream_seed(7, STREAM_SUBSET),
            derive_stream_seed(7, STREAM_ORDER)
        );
        assert_eq!(
            derive_stream_seed(7, STREAM_POOLS),
            derive_stream_seed(7, STREAM_POOLS)
        );
    }
}
