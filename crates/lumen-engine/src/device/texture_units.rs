/// One occupied texture unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Binding<T> {
    texture: T,
    usage: u64,
}

/// Result of [`TextureUnits::assign`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Assignment<T> {
    pub unit: u32,
    /// Texture that lost `unit` to make room, if the table was full.
    pub evicted: Option<T>,
}

/// Fixed-size table of texture units with least-used eviction.
///
/// Usage is stamped from a single counter that only ever increases, so
/// "lowest stamp" means "least recently bound or touched". Eviction is a
/// linear scan; unit counts are small.
#[derive(Debug)]
pub struct TextureUnits<T> {
    units: Vec<Option<Binding<T>>>,
    counter: u64,
}

impl<T: Copy + Eq> TextureUnits<T> {
    pub fn new(count: u32) -> Self {
        Self { units: vec![None; count as usize], counter: 0 }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.units.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn bound(&self, unit: u32) -> Option<T> {
        self.units.get(unit as usize).copied().flatten().map(|b| b.texture)
    }

    pub fn usage(&self, unit: u32) -> Option<u64> {
        self.units.get(unit as usize).copied().flatten().map(|b| b.usage)
    }

    /// Number of occupied units.
    pub fn live(&self) -> usize {
        self.units.iter().filter(|u| u.is_some()).count()
    }

    /// Picks an empty unit, or frees the least-used one.
    ///
    /// The unit is left empty; call [`occupy`](Self::occupy) to claim it.
    /// Returns `None` only when the table has no units at all.
    pub fn assign(&mut self) -> Option<Assignment<T>> {
        if let Some(unit) = self.units.iter().position(Option::is_none) {
            return Some(Assignment { unit: unit as u32, evicted: None });
        }

        let (unit, _) = self
            .units
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.map(|b| (i, b.usage)))
            .min_by_key(|&(_, usage)| usage)?;
        let evicted = self.units[unit].take().map(|b| b.texture);
        Some(Assignment { unit: unit as u32, evicted })
    }

    pub fn occupy(&mut self, unit: u32, texture: T) {
        let usage = self.tick();
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = Some(Binding { texture, usage });
        }
    }

    /// Refreshes the usage stamp of an occupied unit.
    pub fn touch(&mut self, unit: u32) -> bool {
        let usage = self.counter + 1;
        match self.units.get_mut(unit as usize) {
            Some(Some(binding)) => {
                binding.usage = usage;
                self.counter = usage;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self, unit: u32) -> Option<T> {
        self.units.get_mut(unit as usize)?.take().map(|b| b.texture)
    }

    fn tick(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(units: &mut TextureUnits<u32>, texture: u32) -> Assignment<u32> {
        let a = units.assign().unwrap();
        units.occupy(a.unit, texture);
        a
    }

    #[test]
    fn fills_empty_units_first() {
        let mut units = TextureUnits::new(3);
        assert_eq!(bind(&mut units, 10).unit, 0);
        assert_eq!(bind(&mut units, 11).unit, 1);
        assert_eq!(bind(&mut units, 12).unit, 2);
        assert_eq!(units.live(), 3);
    }

    #[test]
    fn evicts_lowest_usage_when_full() {
        let mut units = TextureUnits::new(2);
        bind(&mut units, 10);
        bind(&mut units, 11);
        // 10 becomes the most recently used.
        assert!(units.touch(0));

        let a = bind(&mut units, 12);
        assert_eq!(a, Assignment { unit: 1, evicted: Some(11) });
        assert_eq!(units.bound(0), Some(10));
        assert_eq!(units.bound(1), Some(12));
        assert_eq!(units.live(), 2);
    }

    #[test]
    fn counter_is_monotonic() {
        let mut units = TextureUnits::new(2);
        bind(&mut units, 1);
        let first = units.usage(0).unwrap();
        units.clear(0);
        bind(&mut units, 2);
        assert!(units.usage(0).unwrap() > first);
    }

    #[test]
    fn never_exceeds_unit_count() {
        let mut units = TextureUnits::new(4);
        for t in 0..32 {
            bind(&mut units, t);
            assert!(units.live() <= 4);
        }
    }

    #[test]
    fn zero_units_cannot_assign() {
        let mut units: TextureUnits<u32> = TextureUnits::new(0);
        assert!(units.assign().is_none());
        assert!(!units.touch(0));
    }
}
