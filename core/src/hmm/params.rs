//! Dense HMM parameter tables (`init`, `tran`, `emis`) over a small integer
//! state-id space, with a `char -> id` side table — spec.md §9's "nested
//! dictionaries of floats -> dense 2D tables" design note. The on-disk
//! format stays the string-keyed tuple-of-maps shape spec.md §6 specifies
//! as stable (`[init, tran, emis]`, one-code-point-per-key JSON); this
//! module owns the conversion between that wire format and the flat
//! `Vec<f64>` tables the beam search actually walks.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alphabet::Alphabet;
use crate::error::{CorrectOcrError, Result};

/// The string-keyed tuple-of-maps wire format from spec.md §6: a JSON array
/// `[init, tran, emis]`. Characters are one-code-point UTF-8 strings.
pub type InitWire = BTreeMap<String, f64>;
pub type TranWire = BTreeMap<String, BTreeMap<String, f64>>;
pub type EmisWire = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HmmWire(InitWire, TranWire, EmisWire);

/// Trained (or loaded) HMM parameters: row-stochastic `init`/`tran`/`emis`
/// tables over `states ⊆ alphabet`, materialized densely for cache-friendly
/// beam search arithmetic.
#[derive(Debug, Clone)]
pub struct HmmParams {
    alphabet: Alphabet,
    init: Vec<f64>,
    tran: Vec<f64>,
    emis: Vec<f64>,
}

impl HmmParams {
    pub fn state_count(&self) -> usize {
        self.alphabet.len()
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    #[inline]
    pub fn init(&self, state: usize) -> f64 {
        self.init[state]
    }

    #[inline]
    pub fn tran(&self, from: usize, to: usize) -> f64 {
        self.tran[from * self.state_count() + to]
    }

    #[inline]
    pub fn emis(&self, state: usize, observed: char) -> f64 {
        match self.alphabet.id_of(observed) {
            Some(o) => self.emis[state * self.state_count() + o],
            // Unseen character at inference time: smoothing guarantees no
            // zero row during training, but an observation outside the
            // trained alphabet legitimately scores zero (spec.md §4.4).
            None => 0.0,
        }
    }

    pub fn states(&self) -> impl Iterator<Item = usize> {
        0..self.state_count()
    }

    /// Build from sparse per-character maps, running the structural
    /// parameter check (spec.md §3, §4.3) before materializing dense
    /// tables. Missing inner entries are treated as explicit zeros.
    pub fn from_maps(
        init: HashMap<char, f64>,
        tran: HashMap<char, HashMap<char, f64>>,
        emis: HashMap<char, HashMap<char, f64>>,
    ) -> Result<Self> {
        check_parameters(&init, &tran, &emis)?;

        let chars: Vec<char> = {
            let mut cs: Vec<char> = init.keys().copied().collect();
            cs.sort_unstable();
            cs
        };
        let alphabet = Alphabet::build(&chars, std::iter::empty(), &[]);
        let n = alphabet.len();

        let mut init_dense = vec![0.0; n];
        for (c, p) in &init {
            init_dense[alphabet.id_of(*c).unwrap()] = *p;
        }

        let mut tran_dense = vec![0.0; n * n];
        for (from_c, row) in &tran {
            let from_id = alphabet.id_of(*from_c).unwrap();
            for (to_c, p) in row {
                if let Some(to_id) = alphabet.id_of(*to_c) {
                    tran_dense[from_id * n + to_id] = *p;
                }
            }
        }

        let mut emis_dense = vec![0.0; n * n];
        for (from_c, row) in &emis {
            let from_id = alphabet.id_of(*from_c).unwrap();
            for (o_c, p) in row {
                if let Some(o_id) = alphabet.id_of(*o_c) {
                    emis_dense[from_id * n + o_id] = *p;
                }
            }
        }

        Ok(Self {
            alphabet,
            init: init_dense,
            tran: tran_dense,
            emis: emis_dense,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let HmmWire(init, tran, emis) = serde_json::from_str(&content)?;
        Self::from_maps(unwire(init), unwire_nested(tran), unwire_nested(emis))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let wire = self.to_wire();
        let content = serde_json::to_string_pretty(&wire)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn to_wire(&self) -> HmmWire {
        let n = self.state_count();
        let mut init = InitWire::new();
        let mut tran = TranWire::new();
        let mut emis = EmisWire::new();
        for s in 0..n {
            let sc = self.alphabet.char_at(s).unwrap();
            init.insert(sc.to_string(), self.init[s]);
            let mut trow = BTreeMap::new();
            let mut erow = BTreeMap::new();
            for t in 0..n {
                let tc = self.alphabet.char_at(t).unwrap();
                trow.insert(tc.to_string(), self.tran[s * n + t]);
                erow.insert(tc.to_string(), self.emis[s * n + t]);
            }
            tran.insert(sc.to_string(), trow);
            emis.insert(sc.to_string(), erow);
        }
        HmmWire(init, tran, emis)
    }
}

fn unwire(map: InitWire) -> HashMap<char, f64> {
    map.into_iter()
        .filter_map(|(k, v)| single_char(&k).map(|c| (c, v)))
        .collect()
}

fn unwire_nested(map: BTreeMap<String, BTreeMap<String, f64>>) -> HashMap<char, HashMap<char, f64>> {
    map.into_iter()
        .filter_map(|(k, v)| single_char(&k).map(|c| (c, unwire(v))))
        .collect()
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        None
    } else {
        Some(c)
    }
}

/// Structural invariant from spec.md §3/§4.3: `keys(init) = keys(tran) =
/// keys(emis)`, and every inner `tran[s]` has the same key set as `tran`
/// itself (i.e. `tran` is square). Run before any save, per `HMM.
/// parameter_check` in `model.py`.
fn check_parameters(
    init: &HashMap<char, f64>,
    tran: &HashMap<char, HashMap<char, f64>>,
    emis: &HashMap<char, HashMap<char, f64>>,
) -> Result<()> {
    let init_keys: std::collections::BTreeSet<char> = init.keys().copied().collect();
    let tran_keys: std::collections::BTreeSet<char> = tran.keys().copied().collect();
    let emis_keys: std::collections::BTreeSet<char> = emis.keys().copied().collect();

    if init_keys != tran_keys {
        return Err(CorrectOcrError::Parameter(
            "initial keys do not match transition keys".to_string(),
        ));
    }
    if init_keys != emis_keys {
        return Err(CorrectOcrError::Parameter(
            "initial keys do not match emission keys".to_string(),
        ));
    }
    for (outer, row) in tran {
        let row_keys: std::collections::BTreeSet<char> = row.keys().copied().collect();
        if row_keys != tran_keys {
            return Err(CorrectOcrError::Parameter(format!(
                "outer transition keys do not match inner keys: {outer:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (HashMap<char, f64>, HashMap<char, HashMap<char, f64>>, HashMap<char, HashMap<char, f64>>) {
        let states = ['a', 'b'];
        let init: HashMap<char, f64> = [('a', 0.6), ('b', 0.4)].into_iter().collect();
        let mut tran = HashMap::new();
        let mut emis = HashMap::new();
        for &s in &states {
            let mut trow = HashMap::new();
            let mut erow = HashMap::new();
            for &t in &states {
                trow.insert(t, 0.5);
                erow.insert(t, 0.5);
            }
            tran.insert(s, trow);
            emis.insert(s, erow);
        }
        (init, tran, emis)
    }

    #[test]
    fn mismatched_keys_are_rejected() {
        let (init, mut tran, emis) = toy();
        tran.remove(&'b');
        assert!(HmmParams::from_maps(init, tran, emis).is_err());
    }

    #[test]
    fn square_tables_build_and_round_trip_via_wire() {
        let (init, tran, emis) = toy();
        let params = HmmParams::from_maps(init, tran, emis).unwrap();
        assert_eq!(params.state_count(), 2);
        let a = params.alphabet().id_of('a').unwrap();
        let b = params.alphabet().id_of('b').unwrap();
        assert_eq!(params.tran(a, b), 0.5);
        assert_eq!(params.emis(b, 'a'), 0.5);
        assert_eq!(params.emis(a, 'z'), 0.0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (init, tran, emis) = toy();
        let params = HmmParams::from_maps(init, tran, emis).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hmm.json");
        params.save(&path).unwrap();
        let loaded = HmmParams::load(&path).unwrap();
        assert_eq!(loaded.state_count(), params.state_count());
        let a = loaded.alphabet().id_of('a').unwrap();
        let b = loaded.alphabet().id_of('b').unwrap();
        assert_eq!(loaded.tran(a, b), params.tran(a, b));
    }
}
