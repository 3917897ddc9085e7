//! Kernel Selector
//!
//! Derives the kernel lookup key of a sample from the buffer maps and
//! resolves it against a [`KernelProvider`]. Consecutive samples of a row
//! almost always share a context, so the last resolution is memoized.

use tracing::trace;

use crate::buffer::BufferContext;
use crate::kernel::{KernelContext, KernelProvider, KernelTolerance, KernelView};
use crate::types::ResampleResult;

/// Per-worker kernel resolution with a one-entry memo.
pub struct KernelSelector<'p, P: ?Sized> {
    provider: &'p P,
    tolerance: KernelTolerance,
    memo: Option<(KernelContext, usize)>,
    resolutions: u64,
}

impl<'p, P: KernelProvider + ?Sized> KernelSelector<'p, P> {
    pub fn new(provider: &'p P, tolerance: KernelTolerance) -> Self {
        Self {
            provider,
            tolerance,
            memo: None,
            resolutions: 0,
        }
    }

    pub fn tolerance(&self) -> KernelTolerance {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: KernelTolerance) {
        if tolerance != self.tolerance {
            self.tolerance = tolerance;
            self.reset();
        }
    }

    /// Forget the memoized resolution.
    pub fn reset(&mut self) {
        self.memo = None;
    }

    /// Number of nearest-context searches performed (memo misses).
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }

    /// Lookup key of sample `(row, chan, pol)` on plane `w_plane`.
    ///
    /// The conjugate path reads the conjugate kernel map, the conjugate
    /// lookup frequency and the conjugate polarization map.
    pub fn context(
        ctx: &BufferContext<'_>,
        row: usize,
        chan: usize,
        pol: usize,
        w_plane: usize,
        conjugate: bool,
    ) -> KernelContext {
        let maps = ctx.maps;
        if conjugate {
            let key = maps.conj_cf_map[row];
            KernelContext::new(
                key.orientation,
                key.baseline_class,
                w_plane,
                maps.conj_freq_map[chan],
                ctx.conj_pol(pol),
            )
        } else {
            let key = maps.cf_map[row];
            KernelContext::new(
                key.orientation,
                key.baseline_class,
                w_plane,
                ctx.buffer.freq[chan],
                pol,
            )
        }
    }

    /// Resolve `wanted` to a kernel, from the conjugate table when `conjugate`.
    pub fn select(&mut self, wanted: &KernelContext, conjugate: bool) -> ResampleResult<KernelView<'p>> {
        let index = match self.memo {
            Some((memo, index)) if memo == *wanted => index,
            _ => {
                let index = self.provider.nearest(wanted, &self.tolerance)?;
                self.resolutions += 1;
                trace!(context = %wanted, index, "Resolved kernel context");
                self.memo = Some((*wanted, index));
                index
            }
        };
        if conjugate {
            self.provider.conjugate_kernel(index)
        } else {
            self.provider.kernel(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RowKernelKey, VisBuffer};
    use crate::grid::GridShape;
    use crate::kernel::{KernelStencil, KernelTable};
    use crate::types::ResampleError;

    fn table() -> KernelTable {
        let mut t = KernelTable::new();
        t.insert(KernelContext::new(0.0, 0, 0, 1.0e9, 0), KernelStencil::delta());
        t.insert(
            KernelContext::new(0.5, 0, 0, 1.0e9, 0),
            KernelStencil::gaussian(1, 2, 1.0).unwrap(),
        );
        t.insert(KernelContext::new(0.0, 1, 0, 1.1e9, 1), KernelStencil::delta());
        t
    }

    #[test]
    fn test_context_from_maps() {
        let mut vb = VisBuffer::new(2, vec![1.0e9], 2, 16, 16);
        vb.maps.cf_map[1] = RowKernelKey::new(0.5, 0);
        vb.maps.conj_cf_map[1] = RowKernelKey::new(0.0, 1);
        vb.maps.conj_freq_map = vec![1.1e9];
        vb.maps.conj_pol_map = Some(vec![1, 0]);
        let ctx = BufferContext::new(&vb, &GridShape::new(16, 16, 1, 2)).unwrap();

        let direct = KernelSelector::<KernelTable>::context(&ctx, 1, 0, 0, 0, false);
        assert_eq!(direct, KernelContext::new(0.5, 0, 0, 1.0e9, 0));
        let conj = KernelSelector::<KernelTable>::context(&ctx, 1, 0, 0, 0, true);
        assert_eq!(conj, KernelContext::new(0.0, 1, 0, 1.1e9, 1));
    }

    #[test]
    fn test_memo_avoids_repeat_searches() {
        let t = table();
        let mut sel = KernelSelector::new(&t, KernelTolerance::default());
        let ctx = KernelContext::new(0.499, 0, 0, 1.0e9, 0);
        for _ in 0..5 {
            let k = sel.select(&ctx, false).unwrap();
            assert_eq!(k.support(), [1, 1]);
        }
        assert_eq!(sel.resolutions(), 1);

        sel.select(&KernelContext::new(0.0, 0, 0, 1.0e9, 0), true).unwrap();
        assert_eq!(sel.resolutions(), 2);

        sel.reset();
        sel.select(&KernelContext::new(0.0, 0, 0, 1.0e9, 0), false).unwrap();
        assert_eq!(sel.resolutions(), 3);
    }

    #[test]
    fn test_out_of_tolerance_is_fatal() {
        let t = table();
        let mut sel = KernelSelector::new(&t, KernelTolerance::exact());
        let err = sel
            .select(&KernelContext::new(0.25, 0, 0, 1.0e9, 0), false)
            .unwrap_err();
        assert!(matches!(err, ResampleError::KernelContextNotFound(_)));
        assert!(err.is_configuration());
    }
}
