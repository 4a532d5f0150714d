//! Environmental impact of delivered organic waste.
//!
//! Pure and deterministic: the same cumulative masses always produce the
//! same snapshot, so it can be derived on every read instead of stored.

use std::collections::BTreeMap;

use sowama_types::models::ImpactSnapshot;

/// Per-kilogram conversion factors for one waste type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactFactors {
    /// kg CO2 avoided per kg delivered
    pub co2: f64,
    /// kg compost per kg delivered
    pub compost: f64,
    /// m3 biogas per kg delivered
    pub biogas: f64,
}

/// Fallback for waste types added after these tables were written.
pub const DEFAULT_FACTORS: ImpactFactors = ImpactFactors {
    co2: 0.40,
    compost: 0.30,
    biogas: 0.08,
};

/// Yearly CO2 uptake of one tree, in kg.
pub const CO2_PER_TREE_KG: f64 = 22.0;

pub fn factors_for(waste_type_id: &str) -> ImpactFactors {
    match waste_type_id {
        "food_scraps" => ImpactFactors {
            co2: 0.50,
            compost: 0.30,
            biogas: 0.12,
        },
        "garden_waste" => ImpactFactors {
            co2: 0.35,
            compost: 0.40,
            biogas: 0.05,
        },
        "coffee_grounds" => ImpactFactors {
            co2: 0.45,
            compost: 0.35,
            biogas: 0.08,
        },
        "eggshells" => ImpactFactors {
            co2: 0.10,
            compost: 0.20,
            biogas: 0.0,
        },
        _ => DEFAULT_FACTORS,
    }
}

/// Maps cumulative delivered kg per waste type to impact metrics.
/// Negative or NaN masses count as zero.
pub fn calculate(delivered_kg: &BTreeMap<String, f64>) -> ImpactSnapshot {
    let mut snapshot = ImpactSnapshot::default();

    // BTreeMap iteration order keeps float summation order fixed
    for (waste_type_id, kg) in delivered_kg {
        let kg = kg.max(0.0);
        let f = factors_for(waste_type_id);
        snapshot.co2_avoided += kg * f.co2;
        snapshot.compost_generated += kg * f.compost;
        snapshot.biogas_produced += kg * f.biogas;
    }

    snapshot.trees_equivalent = snapshot.co2_avoided / CO2_PER_TREE_KG;
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masses(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(calculate(&BTreeMap::new()), ImpactSnapshot::default());
    }

    #[test]
    fn deterministic_bit_for_bit() {
        let input = masses(&[
            ("food_scraps", 12.3),
            ("garden_waste", 4.56),
            ("coffee_grounds", 0.7),
            ("mystery", 1.1),
        ]);
        let a = calculate(&input);
        let b = calculate(&input.clone());
        assert_eq!(a.co2_avoided.to_bits(), b.co2_avoided.to_bits());
        assert_eq!(a.compost_generated.to_bits(), b.compost_generated.to_bits());
        assert_eq!(a.biogas_produced.to_bits(), b.biogas_produced.to_bits());
        assert_eq!(a.trees_equivalent.to_bits(), b.trees_equivalent.to_bits());
    }

    #[test]
    fn known_factors() {
        let snapshot = calculate(&masses(&[("food_scraps", 44.0)]));
        assert!((snapshot.co2_avoided - 22.0).abs() < 1e-9);
        assert!((snapshot.trees_equivalent - 1.0).abs() < 1e-9);
        assert!((snapshot.compost_generated - 13.2).abs() < 1e-9);
    }

    #[test]
    fn unknown_types_use_default_and_negatives_are_ignored() {
        let snapshot = calculate(&masses(&[("textiles", 10.0), ("eggshells", -5.0)]));
        assert!((snapshot.co2_avoided - 4.0).abs() < 1e-9);
        assert!((snapshot.biogas_produced - 0.8).abs() < 1e-9);
    }
}
