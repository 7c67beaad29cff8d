// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.

/// Compressed-sparse-row adjacency in both directions.
///
/// Forward: `targets[offsets[n]..offsets[n + 1]]` are the out-neighbors of
/// node `n`. The inverse arrays answer the same question from the target
/// side and are derived deterministically from the forward representation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsrTopology {
    pub offsets: Vec<u32>,
    pub targets: Vec<u32>,
    pub inverse_offsets: Vec<u32>,
    pub inverse_sources: Vec<u32>,
}

/// Pure function of `(sources, targets, edge_count, high_water)`: building
/// twice from the same inputs yields identical arrays.
pub fn build_csr(
    sources: &[u32],
    targets: &[u32],
    edge_count: usize,
    high_water: usize,
) -> CsrTopology {
    let (offsets, packed_targets) = pack(sources, targets, edge_count, high_water);
    let (inverse_offsets, inverse_sources) = pack(targets, sources, edge_count, high_water);
    CsrTopology {
        offsets,
        targets: packed_targets,
        inverse_offsets,
        inverse_sources,
    }
}

fn pack(keys: &[u32], values: &[u32], edge_count: usize, high_water: usize) -> (Vec<u32>, Vec<u32>) {
    let mut offsets = vec![0u32; high_water + 1];
    for &key in &keys[..edge_count] {
        offsets[key as usize + 1] += 1;
    }
    for i in 1..offsets.len() {
        offsets[i] += offsets[i - 1];
    }
    let mut cursor = offsets.clone();
    let mut packed = vec![0u32; edge_count];
    for e in 0..edge_count {
        let key = keys[e] as usize;
        packed[cursor[key] as usize] = values[e];
        cursor[key] += 1;
    }
    (offsets, packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_packs_forward_and_inverse() {
        // e0=(0,1), e1=(1,2), e2=(0,2), e3=(2,0)
        let sources = [0, 1, 0, 2];
        let targets = [1, 2, 2, 0];
        let csr = build_csr(&sources, &targets, 4, 3);
        assert_eq!(csr.offsets, vec![0, 2, 3, 4]);
        assert_eq!(csr.targets, vec![1, 2, 2, 0]);
        assert_eq!(csr.inverse_offsets, vec![0, 1, 2, 4]);
        assert_eq!(csr.inverse_sources, vec![2, 0, 1, 0]);
        assert_eq!(*csr.offsets.last().unwrap() as usize, 4);
    }

    #[test]
    fn it_is_a_pure_function_of_its_inputs() {
        fastrand::seed(7);
        let high_water = 40;
        let sources: Vec<u32> = (0..300).map(|_| fastrand::u32(..high_water)).collect();
        let targets: Vec<u32> = (0..300).map(|_| fastrand::u32(..high_water)).collect();
        let a = build_csr(&sources, &targets, 300, high_water as usize);
        let b = build_csr(&sources, &targets, 300, high_water as usize);
        assert_eq!(a, b);
    }

    #[test]
    fn offsets_are_monotone_and_terminate_at_edge_count() {
        fastrand::seed(99);
        let high_water = 17u32;
        let sources: Vec<u32> = (0..64).map(|_| fastrand::u32(..high_water)).collect();
        let targets: Vec<u32> = (0..64).map(|_| fastrand::u32(..high_water)).collect();
        let csr = build_csr(&sources, &targets, 64, high_water as usize);
        assert_eq!(csr.offsets.len(), high_water as usize + 1);
        assert!(csr.offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*csr.offsets.last().unwrap(), 64);
        assert!(csr.inverse_offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*csr.inverse_offsets.last().unwrap(), 64);
    }

    #[test]
    fn ignores_slots_beyond_edge_count() {
        let sources = [0, 1, 7, 7];
        let targets = [1, 0, 7, 7];
        let csr = build_csr(&sources, &targets, 2, 2);
        assert_eq!(csr.offsets, vec![0, 1, 2]);
        assert_eq!(csr.targets, vec![1, 0]);
    }
}
