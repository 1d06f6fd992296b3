//! Fitness adapters over the multilayer-sphere dipole scattering model.
//!
//! The electromagnetics live in the external `sphereml` Python module. It
//! computes the directivity of a point dipole embedded in a layered
//! sphere. This module reshapes optimizer genomes into that model's
//! parameters. It also owns the PyO3 bridge that calls into the module.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::OnceLock;

use log::{error, info, warn};
use num_complex::Complex64;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fitness::FitnessFunction;
use crate::limits::Limits;

/// Cached `sphereml` module
static SPHEREML: OnceLock<Py<PyAny>> = OnceLock::new();

/// Genome lengths are in nanometres; the solver works in micrometres
const NM_PER_UM: f64 = 1000.0;

/// Everything the directivity solver needs for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectivityRequest {
    /// Outer radius of each layer in µm, innermost first
    pub radii: Vec<f64>,
    /// Permittivity of each layer followed by the host medium
    pub permittivities: Vec<Complex64>,
    /// Radial dipole position in µm
    pub dipole_position: f64,
    pub wavelength: f64,
    /// Dipole moment `(px, py, pz)`
    pub dipole: [f64; 3],
    pub theta: f64,
    pub phi: f64,
    /// Multipole truncation order; `None` lets the solver choose
    pub max_order: Option<usize>,
}

/// The seam to the external electromagnetic solver
pub trait DirectivitySolver: Send + Sync {
    fn directivity(&self, request: &DirectivityRequest) -> Result<f64>;
}

/// Fixed physical setup shared by every evaluation of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatteringSetup {
    /// Vacuum wavelength in µm
    #[serde(default = "default_wavelength")]
    pub wavelength: f64,
    #[serde(default = "default_dipole")]
    pub dipole: [f64; 3],
    /// Observation polar angle
    #[serde(default = "default_theta")]
    pub theta: f64,
    #[serde(default)]
    pub phi: f64,
    #[serde(default)]
    pub max_order: Option<usize>,
}

fn default_wavelength() -> f64 {
    0.455
}
fn default_dipole() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}
fn default_theta() -> f64 {
    PI
}

impl Default for ScatteringSetup {
    fn default() -> Self {
        Self {
            wavelength: default_wavelength(),
            dipole: default_dipole(),
            theta: default_theta(),
            phi: 0.0,
            max_order: None,
        }
    }
}

impl ScatteringSetup {
    /// Build a request, appending the vacuum host permittivity
    pub fn request(&self, radii: Vec<f64>, layer_permittivities: Vec<Complex64>, dipole_position: f64) -> DirectivityRequest {
        let mut permittivities = layer_permittivities;
        permittivities.push(Complex64::new(1.0, 0.0));
        DirectivityRequest {
            radii,
            permittivities,
            dipole_position,
            wavelength: self.wavelength,
            dipole: self.dipole,
            theta: self.theta,
            phi: self.phi,
            max_order: self.max_order,
        }
    }
}

/// Search ranges for the layered design, all lengths in nanometres
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeredRanges {
    #[serde(default = "default_radius_nm")]
    pub radius_nm: (f64, f64),
    #[serde(default = "default_permittivity_re")]
    pub permittivity_re: (f64, f64),
    #[serde(default = "default_permittivity_im")]
    pub permittivity_im: (f64, f64),
    #[serde(default = "default_radius_nm")]
    pub dipole_nm: (f64, f64),
}

fn default_radius_nm() -> (f64, f64) {
    (20.0, 230.0)
}
fn default_permittivity_re() -> (f64, f64) {
    (1.0, 16.0)
}
fn default_permittivity_im() -> (f64, f64) {
    (0.0, 0.0)
}

impl Default for LayeredRanges {
    fn default() -> Self {
        Self {
            radius_nm: default_radius_nm(),
            permittivity_re: default_permittivity_re(),
            permittivity_im: default_permittivity_im(),
            dipole_nm: default_radius_nm(),
        }
    }
}

/// Genome `[x_1..x_L, re_1, im_1, .., re_L, im_L, r]`: layer radii and
/// dipole position in nm plus interleaved complex permittivities.
pub struct LayeredDesign<S> {
    pub layers: usize,
    pub setup: ScatteringSetup,
    solver: S,
}

impl<S: DirectivitySolver> LayeredDesign<S> {
    pub fn new(layers: usize, setup: ScatteringSetup, solver: S) -> Self {
        Self { layers, setup, solver }
    }

    pub fn genome_len(&self) -> usize {
        3 * self.layers + 1
    }

    /// Box in genome order for the given ranges
    pub fn limits(&self, ranges: &LayeredRanges) -> Result<Limits> {
        let mut bounds = Vec::with_capacity(self.genome_len());
        bounds.extend(std::iter::repeat(ranges.radius_nm).take(self.layers));
        for _ in 0..self.layers {
            bounds.push(ranges.permittivity_re);
            bounds.push(ranges.permittivity_im);
        }
        bounds.push(ranges.dipole_nm);
        Limits::new(bounds)
    }

    /// Reshape a genome into a solver request. Layers are reordered by
    /// radius and keep their own permittivity.
    pub fn request(&self, genome: &[f64]) -> Result<DirectivityRequest> {
        if genome.len() != self.genome_len() {
            return Err(Error::GenomeLength {
                expected: self.genome_len(),
                actual: genome.len(),
            });
        }
        let layers = self.layers;
        let dipole_nm = genome[genome.len() - 1];
        let radii_nm = &genome[..layers];
        let permittivities = genome[layers..3 * layers]
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]));

        let mut sorted: Vec<(f64, Complex64)> = radii_nm.iter().copied().zip(permittivities).collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let radii = sorted.iter().map(|(x, _)| x / NM_PER_UM).collect();
        let eps = sorted.iter().map(|(_, m)| *m).collect();
        Ok(self.setup.request(radii, eps, dipole_nm / NM_PER_UM))
    }

    /// Directivity of a genome; NaN when the solver diverges
    pub fn directivity(&self, genome: &[f64]) -> Result<f64> {
        let request = self.request(genome)?;
        let value = self.solver.directivity(&request)?;
        if value.is_nan() {
            error!("!!! ERROR {:?}", genome);
            error!(" eL:{:?}", request.permittivities);
            error!(" RL:{:?}", request.radii);
            error!("  x:{:?}", &genome[..self.layers]);
        }
        Ok(value)
    }
}

impl<S: DirectivitySolver> FitnessFunction for LayeredDesign<S> {
    fn evaluate(&self, genome: &[f64]) -> f64 {
        self.directivity(genome).unwrap_or_else(|e| {
            error!("Layered design evaluation failed: {}", e);
            f64::NAN
        })
    }
}

/// Genome of `2 * layers` values in `[0, 1]`, scaled by the largest
/// allowed radius `max_ratio * wavelength`.
///
/// Gene 0 places the dipole anywhere up to twice the outer radius. Genes
/// `1..layers` are the inner radii relative to the outer one, which is
/// pinned at 1. The last `layers` genes map linearly onto real
/// permittivities in `[1, max_index + 1]`.
pub struct NormalizedDesign<S> {
    pub layers: usize,
    pub max_ratio: f64,
    pub max_index: f64,
    pub setup: ScatteringSetup,
    solver: S,
}

/// `numpy.isclose` default tolerances
const ISCLOSE_RTOL: f64 = 1e-5;
const ISCLOSE_ATOL: f64 = 1e-8;

fn isclose(a: f64, b: f64) -> bool {
    (a - b).abs() <= ISCLOSE_ATOL + ISCLOSE_RTOL * b.abs()
}

impl<S: DirectivitySolver> NormalizedDesign<S> {
    pub fn new(layers: usize, max_ratio: f64, setup: ScatteringSetup, solver: S) -> Self {
        Self {
            layers,
            max_ratio,
            max_index: 40.0,
            setup,
            solver,
        }
    }

    pub fn genome_len(&self) -> usize {
        2 * self.layers
    }

    pub fn limits(&self) -> Result<Limits> {
        Limits::uniform(self.genome_len(), 0.0, 1.0)
    }

    pub fn rmax(&self) -> f64 {
        self.max_ratio * self.setup.wavelength
    }

    pub fn request(&self, genome: &[f64]) -> Result<DirectivityRequest> {
        if genome.len() != self.genome_len() {
            return Err(Error::GenomeLength {
                expected: self.genome_len(),
                actual: genome.len(),
            });
        }
        let rmax = self.rmax();
        let dipole_position = 2.0 * genome[0] * rmax;

        let mut relative: Vec<f64> = genome[1..self.layers].to_vec();
        relative.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        relative.push(1.0);
        let radii = relative.into_iter().map(|r| r * rmax).collect();

        let eps = genome[self.layers..]
            .iter()
            .map(|p| Complex64::new(p * self.max_index + 1.0, 0.0))
            .collect();
        Ok(self.setup.request(radii, eps, dipole_position))
    }

    pub fn directivity(&self, genome: &[f64]) -> Result<f64> {
        let request = self.request(genome)?;
        // A dipole sitting exactly on an interface is singular
        if request.radii.iter().any(|&r| isclose(request.dipole_position, r)) {
            return Ok(0.0);
        }
        let value = self.solver.directivity(&request)?;
        Ok(if value.is_nan() { 0.0 } else { value })
    }
}

impl<S: DirectivitySolver> FitnessFunction for NormalizedDesign<S> {
    fn evaluate(&self, genome: &[f64]) -> f64 {
        self.directivity(genome).unwrap_or_else(|e| {
            error!("Normalized design evaluation failed: {}", e);
            0.0
        })
    }
}

/// Directivity as the dipole moves outward from the centre in steps of
/// `step` µm, for a fixed layered sphere. Returns `(position, directivity)`.
pub fn scan_dipole_position<S: DirectivitySolver + ?Sized>(
    solver: &S,
    setup: &ScatteringSetup,
    radii: &[f64],
    layer_permittivities: &[Complex64],
    step: f64,
    count: usize,
) -> Result<Vec<(f64, f64)>> {
    if radii.len() != layer_permittivities.len() {
        return Err(Error::GenomeLength {
            expected: radii.len(),
            actual: layer_permittivities.len(),
        });
    }
    (0..count)
        .map(|i| {
            let position = step * i as f64;
            let request = setup.request(radii.to_vec(), layer_permittivities.to_vec(), position);
            Ok((position, solver.directivity(&request)?))
        })
        .collect()
}

/// The position scan repeated at several multipole orders, to check that
/// the series has converged. Rows are `(position, [directivity per order])`
/// with columns in the order given. No orders means one column at the
/// setup's own order.
pub fn scan_dipole_position_orders<S: DirectivitySolver + ?Sized>(
    solver: &S,
    setup: &ScatteringSetup,
    radii: &[f64],
    layer_permittivities: &[Complex64],
    step: f64,
    count: usize,
    orders: &[usize],
) -> Result<Vec<(f64, Vec<f64>)>> {
    let setups: Vec<ScatteringSetup> = if orders.is_empty() {
        vec![setup.clone()]
    } else {
        orders
            .iter()
            .map(|&order| ScatteringSetup {
                max_order: Some(order),
                ..setup.clone()
            })
            .collect()
    };

    let mut rows: Vec<(f64, Vec<f64>)> = (0..count)
        .map(|i| (step * i as f64, Vec::with_capacity(setups.len())))
        .collect();
    for setup in &setups {
        let column = scan_dipole_position(solver, setup, radii, layer_permittivities, step, count)?;
        for (row, (_, directivity)) in rows.iter_mut().zip(column) {
            row.1.push(directivity);
        }
    }
    Ok(rows)
}

/// `sphereml` called through an embedded Python interpreter
#[derive(Debug, Clone, Copy)]
pub struct SphereMl {
    _initialized: (),
}

impl SphereMl {
    /// Import `sphereml` once per process.
    ///
    /// The working directory and any virtualenv site-packages are put on
    /// `sys.path` first, so a locally built extension module is found.
    pub fn init() -> Result<Self> {
        if SPHEREML.get().is_some() {
            return Ok(Self { _initialized: () });
        }
        Python::with_gil(|py| -> PyResult<()> {
            let sys = py.import("sys")?;
            let path: Bound<'_, PyList> = sys.getattr("path")?.downcast_into()?;

            let bridge_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            path.insert(0, bridge_dir.to_string_lossy().to_string())?;

            for py_ver in ["python3.12", "python3.11", "python3.10"] {
                let mut candidates = vec![bridge_dir.join(format!(".venv/lib/{}/site-packages", py_ver))];
                if let Ok(venv_dir) = std::env::var("VIRTUAL_ENV") {
                    candidates.push(PathBuf::from(venv_dir).join(format!("lib/{}/site-packages", py_ver)));
                }
                if let Some(site) = candidates.into_iter().find(|p| p.exists()) {
                    path.insert(0, site.to_string_lossy().to_string())?;
                    break;
                }
            }

            let module = py.import("sphereml")?;
            SPHEREML.get_or_init(|| module.into_any().unbind());
            Ok(())
        })?;
        info!("sphereml bridge initialized");
        Ok(Self { _initialized: () })
    }

    pub fn is_available() -> bool {
        SPHEREML.get().is_some()
    }
}

impl DirectivitySolver for SphereMl {
    fn directivity(&self, request: &DirectivityRequest) -> Result<f64> {
        let value = Python::with_gil(|py| -> PyResult<f64> {
            let module = SPHEREML
                .get()
                .ok_or_else(|| pyo3::exceptions::PyRuntimeError::new_err("sphereml bridge not initialized"))?
                .bind(py);

            let numpy = py.import("numpy")?;
            let radii = numpy.call_method1("array", (request.radii.clone(),))?;
            let permittivities = numpy.call_method1("array", (request.permittivities.clone(),))?;

            let kwargs = PyDict::new(py);
            kwargs.set_item("th", request.theta)?;
            kwargs.set_item("ph", request.phi)?;
            if let Some(order) = request.max_order {
                kwargs.set_item("N", order)?;
            }

            let [px, py_, pz] = request.dipole;
            let result = module.call_method(
                "evaluate_directivity",
                (
                    radii,
                    permittivities,
                    request.dipole_position,
                    request.wavelength,
                    px,
                    py_,
                    pz,
                ),
                Some(&kwargs),
            )?;
            result.extract()
        })?;
        if value.is_infinite() {
            warn!("sphereml returned {} for {:?}", value, request);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requests and answers with the sum of the radii
    struct MockSolver {
        calls: Mutex<Vec<DirectivityRequest>>,
        answer_nan: bool,
    }

    impl MockSolver {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer_nan: false,
            }
        }

        fn last(&self) -> DirectivityRequest {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl DirectivitySolver for MockSolver {
        fn directivity(&self, request: &DirectivityRequest) -> Result<f64> {
            self.calls.lock().unwrap().push(request.clone());
            if self.answer_nan {
                Ok(f64::NAN)
            } else {
                Ok(request.radii.iter().sum())
            }
        }
    }

    impl DirectivitySolver for &MockSolver {
        fn directivity(&self, request: &DirectivityRequest) -> Result<f64> {
            (**self).directivity(request)
        }
    }

    #[test]
    fn test_layered_reshapes_and_sorts() {
        let solver = MockSolver::new();
        let design = LayeredDesign::new(2, ScatteringSetup::default(), &solver);
        // radii 200, 100; eps (3+0.1i), (5+0.2i); dipole 50 nm
        let genome = [200.0, 100.0, 3.0, 0.1, 5.0, 0.2, 50.0];
        let value = design.evaluate(&genome);
        assert!((value - 0.3).abs() < 1e-12);

        let req = solver.last();
        assert_eq!(req.radii, vec![0.1, 0.2]);
        assert_eq!(
            req.permittivities,
            vec![Complex64::new(5.0, 0.2), Complex64::new(3.0, 0.1), Complex64::new(1.0, 0.0)]
        );
        assert!((req.dipole_position - 0.05).abs() < 1e-15);
        assert_eq!(req.wavelength, 0.455);
        assert_eq!(req.dipole, [1.0, 0.0, 0.0]);
        assert_eq!(req.theta, PI);
        assert_eq!(req.phi, 0.0);
    }

    #[test]
    fn test_layered_rejects_wrong_length() {
        let design = LayeredDesign::new(2, ScatteringSetup::default(), MockSolver::new());
        let result = design.directivity(&[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(Error::GenomeLength { expected: 7, actual: 3 })));
        assert!(design.evaluate(&[1.0]).is_nan());
    }

    #[test]
    fn test_layered_passes_nan_through() {
        let solver = MockSolver {
            calls: Mutex::new(Vec::new()),
            answer_nan: true,
        };
        let design = LayeredDesign::new(1, ScatteringSetup::default(), solver);
        assert!(design.evaluate(&[100.0, 2.0, 0.0, 10.0]).is_nan());
    }

    #[test]
    fn test_layered_limits_in_genome_order() {
        let design = LayeredDesign::new(2, ScatteringSetup::default(), MockSolver::new());
        let ranges = LayeredRanges {
            radius_nm: (10.0, 20.0),
            permittivity_re: (1.0, 2.0),
            permittivity_im: (0.0, 0.5),
            dipole_nm: (0.0, 5.0),
        };
        let limits = design.limits(&ranges).unwrap();
        let bounds: Vec<(f64, f64)> = limits.into();
        assert_eq!(
            bounds,
            vec![
                (10.0, 20.0),
                (10.0, 20.0),
                (1.0, 2.0),
                (0.0, 0.5),
                (1.0, 2.0),
                (0.0, 0.5),
                (0.0, 5.0)
            ]
        );
    }

    #[test]
    fn test_normalized_reshape() {
        let solver = MockSolver::new();
        let mut design = NormalizedDesign::new(3, 1.0, ScatteringSetup::default(), &solver);
        design.max_index = 40.0;
        let genome = [0.1, 0.8, 0.4, 0.0, 0.5, 1.0];
        design.evaluate(&genome);

        let req = solver.last();
        let rmax = 0.455;
        assert!((req.dipole_position - 0.2 * rmax).abs() < 1e-12);
        let expected_radii = [0.4 * rmax, 0.8 * rmax, rmax];
        for (r, e) in req.radii.iter().zip(expected_radii) {
            assert!((r - e).abs() < 1e-12);
        }
        let re: Vec<f64> = req.permittivities.iter().map(|c| c.re).collect();
        assert_eq!(re, vec![1.0, 21.0, 41.0, 1.0]);
    }

    #[test]
    fn test_normalized_dipole_on_interface_scores_zero() {
        let solver = MockSolver::new();
        let design = NormalizedDesign::new(2, 1.0, ScatteringSetup::default(), &solver);
        // Rd = 2 * 0.5 * rmax = rmax, the outer radius
        assert_eq!(design.evaluate(&[0.5, 0.3, 0.2, 0.2]), 0.0);
        assert!(solver.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_normalized_nan_scores_zero() {
        let solver = MockSolver {
            calls: Mutex::new(Vec::new()),
            answer_nan: true,
        };
        let design = NormalizedDesign::new(2, 1.0, ScatteringSetup::default(), solver);
        assert_eq!(design.evaluate(&[0.1, 0.3, 0.2, 0.2]), 0.0);
    }

    #[test]
    fn test_scan_positions() {
        let solver = MockSolver::new();
        let setup = ScatteringSetup::default();
        let eps = [Complex64::new(4.0, 0.0), Complex64::new(6.0, 0.0)];
        let scan = scan_dipole_position(&solver, &setup, &[0.09, 0.11], &eps, 0.001, 4).unwrap();
        assert_eq!(scan.len(), 4);
        assert!((scan[3].0 - 0.003).abs() < 1e-15);
        assert!((scan[0].1 - 0.2).abs() < 1e-12);
        assert_eq!(solver.last().permittivities.len(), 3);
    }

    #[test]
    fn test_scan_one_column_per_order() {
        let solver = MockSolver::new();
        let setup = ScatteringSetup::default();
        let eps = [Complex64::new(4.0, 0.0); 3];
        let radii = [0.09, 0.11, 0.13];
        let rows = scan_dipole_position_orders(&solver, &setup, &radii, &eps, 0.001, 5, &[8, 75]).unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|(_, column)| column.len() == 2));
        assert!((rows[4].0 - 0.004).abs() < 1e-15);

        let calls = solver.calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls[0].max_order, Some(8));
        assert_eq!(calls[9].max_order, Some(75));
        assert_eq!(calls[9].dipole_position, rows[4].0);
    }

    #[test]
    fn test_scan_without_orders_uses_setup() {
        let solver = MockSolver::new();
        let setup = ScatteringSetup {
            max_order: Some(12),
            ..Default::default()
        };
        let eps = [Complex64::new(4.0, 0.0)];
        let rows = scan_dipole_position_orders(&solver, &setup, &[0.1], &eps, 0.01, 3, &[]).unwrap();
        assert!(rows.iter().all(|(_, column)| column.len() == 1));
        assert_eq!(solver.last().max_order, Some(12));
    }

    #[test]
    fn test_scan_checks_lengths() {
        let solver = MockSolver::new();
        let result = scan_dipole_position(&solver, &ScatteringSetup::default(), &[0.1], &[], 0.01, 3);
        assert!(result.is_err());
    }
}
