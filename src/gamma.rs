//! The 8bpp gamma LUT.

const LUT_ENTRIES: usize = 256;

/// One `struct drm_color_lut` entry: 16-bit R/G/B plus a reserved field.
#[derive(Clone, Copy, Default)]
struct Entry {
    r: u16,
    g: u16,
    b: u16,
    reserved: u16,
}

/// The full 256-entry palette, updated incrementally by `SetColors` and
/// serialized whole into a fresh `GAMMA_LUT` blob on every call.
pub struct GammaTable {
    entries: [Entry; LUT_ENTRIES],
}

impl Default for GammaTable {
    fn default() -> Self {
        GammaTable {
            entries: [Entry::default(); LUT_ENTRIES],
        }
    }
}

impl GammaTable {
    /// Writes `colors` (8-bit R,G,B triples) starting at `first`,
    /// widened to 16 bits via `c << 8`. Entries past index 255 are
    /// silently dropped, matching the fixed 256-entry table size.
    pub fn set_colors(&mut self, first: usize, colors: &[(u8, u8, u8)]) {
        for (offset, &(r, g, b)) in colors.iter().enumerate() {
            let idx = first + offset;
            if idx >= LUT_ENTRIES {
                break;
            }
            self.entries[idx] = Entry {
                r: (r as u16) << 8,
                g: (g as u16) << 8,
                b: (b as u16) << 8,
                reserved: 0,
            };
        }
    }

    /// Serializes the table into the byte layout `drmModeCreatePropertyBlob`
    /// expects for a `GAMMA_LUT` blob (an array of `struct drm_color_lut`).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LUT_ENTRIES * 8);
        for entry in &self.entries {
            out.extend_from_slice(&entry.r.to_ne_bytes());
            out.extend_from_slice(&entry.g.to_ne_bytes());
            out.extend_from_slice(&entry.b.to_ne_bytes());
            out.extend_from_slice(&entry.reserved.to_ne_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_colors_widens_to_16_bits() {
        let mut table = GammaTable::default();
        table.set_colors(0, &[(0xff, 0x80, 0x01)]);
        let bytes = table.to_bytes();
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 0xff00);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 0x8000);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]), 0x0100);
    }

    #[test]
    fn set_colors_only_touches_the_requested_range() {
        let mut table = GammaTable::default();
        table.set_colors(10, &[(1, 1, 1), (2, 2, 2)]);
        let bytes = table.to_bytes();
        // Entry 9 (untouched) stays zero.
        assert_eq!(&bytes[9 * 8..9 * 8 + 8], &[0u8; 8]);
        // Entry 10 was written.
        assert_eq!(u16::from_ne_bytes([bytes[10 * 8], bytes[10 * 8 + 1]]), 0x0100);
    }

    #[test]
    fn set_colors_drops_entries_past_the_table_end() {
        let mut table = GammaTable::default();
        let colors: Vec<(u8, u8, u8)> = (0..4).map(|_| (9, 9, 9)).collect();
        table.set_colors(254, &colors); // would overflow past index 255
        assert_eq!(table.to_bytes().len(), LUT_ENTRIES * 8);
    }

    #[test]
    fn serialized_length_matches_kernel_struct_size() {
        let table = GammaTable::default();
        assert_eq!(table.to_bytes().len(), LUT_ENTRIES * std::mem::size_of::<u16>() * 4);
    }
}
