/// One sample of the simulated state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct State {
    /// STN firing rate
    pub stn: f64,
    /// GPe firing rate
    pub gpe: f64,
    /// Adaptive gain
    pub theta: f64,
}

impl State {
    pub const fn new(stn: f64, gpe: f64, theta: f64) -> Self {
        Self { stn, gpe, theta }
    }
}

// SoA
/// Fixed-capacity state history.
///
/// All columns are allocated at construction; the simulator writes each index
/// exactly once, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct History {
    stn: Vec<f64>,
    gpe: Vec<f64>,
    theta: Vec<f64>,
}

impl History {
    /// `len` samples, the first `prefix` of them set to `initial`, the rest zero.
    pub fn with_prefix(len: usize, prefix: usize, initial: State) -> Self {
        let prefix = prefix.min(len);
        let column = |v: f64| {
            let mut c = vec![0.0; len];
            c[..prefix].fill(v);
            c
        };
        Self {
            stn: column(initial.stn),
            gpe: column(initial.gpe),
            theta: column(initial.theta),
        }
    }

    /// Build from equal-length columns.
    ///
    /// # Panics
    /// If the column lengths differ.
    pub fn from_columns(stn: Vec<f64>, gpe: Vec<f64>, theta: Vec<f64>) -> Self {
        assert!(stn.len() == gpe.len() && gpe.len() == theta.len());
        Self { stn, gpe, theta }
    }

    pub fn len(&self) -> usize {
        self.stn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stn.is_empty()
    }

    pub fn get(&self, i: usize) -> State {
        State::new(self.stn[i], self.gpe[i], self.theta[i])
    }

    pub(crate) fn set(&mut self, i: usize, state: State) {
        self.stn[i] = state.stn;
        self.gpe[i] = state.gpe;
        self.theta[i] = state.theta;
    }

    pub fn stn(&self) -> &[f64] {
        &self.stn
    }

    pub fn gpe(&self) -> &[f64] {
        &self.gpe
    }

    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// Read-only view of indices `0..end`.
    pub fn prefix(&self, end: usize) -> HistoryView<'_> {
        HistoryView {
            stn: &self.stn[..end],
            gpe: &self.gpe[..end],
            theta: &self.theta[..end],
        }
    }

    pub fn view(&self) -> HistoryView<'_> {
        self.prefix(self.len())
    }
}

/// Borrowed, read-only window over a [`History`].
#[derive(Clone, Copy, Debug)]
pub struct HistoryView<'a> {
    stn: &'a [f64],
    gpe: &'a [f64],
    theta: &'a [f64],
}

impl<'a> HistoryView<'a> {
    pub fn len(&self) -> usize {
        self.stn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stn.is_empty()
    }

    /// Most recent state, if any.
    pub fn last(&self) -> Option<State> {
        let i = self.len().checked_sub(1)?;
        Some(State::new(self.stn[i], self.gpe[i], self.theta[i]))
    }

    pub fn get(&self, i: usize) -> State {
        State::new(self.stn[i], self.gpe[i], self.theta[i])
    }

    /// Last `n` samples, or all of them if fewer exist.
    pub fn tail(&self, n: usize) -> HistoryView<'a> {
        let start = self.len().saturating_sub(n);
        HistoryView {
            stn: &self.stn[start..],
            gpe: &self.gpe[start..],
            theta: &self.theta[start..],
        }
    }

    pub fn stn(&self) -> &'a [f64] {
        self.stn
    }

    pub fn gpe(&self) -> &'a [f64] {
        self.gpe
    }

    pub fn theta(&self) -> &'a [f64] {
        self.theta
    }
}
