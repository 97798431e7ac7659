//! Whole-body physiologically based pharmacokinetic model of sorafenib
//!
//! Organ submodels for intestine, liver and kidney are built as declarative
//! [`ModelDefinition`]s, embedded into the circulation by the body assembler
//! and flattened into one model. The [`Simulator`] integrates the flat model
//! over multi-segment dosing regimens, and [`calculate_pk`] extracts
//! non-compartmental parameters from the resulting plasma curves.
//!
//! ```ignore
//! use sorafenib_pbpk::prelude::*;
//!
//! let units = UnitCatalogue::standard();
//! let model = whole_body(&units)?;
//! let simulator = Simulator::new(&model, &units, SolverOptions::default())?;
//! let tc = Timecourse::new(0.0, 1440.0, 200).change("PODOSE_sor", 400.0);
//! let trajectory = simulator.timecourse(&TimecourseSim::new(vec![tc]).with_selections(&["[Cve_sor]"]))?;
//! let curve = ConcentrationCurve::from_trajectory(&trajectory, "[Cve_sor]")?;
//! let pk = calculate_pk(&curve, &Quantity::new(400.0 / 464.826, "mmole"), &PkOptions::default())?;
//! ```

pub mod error;
pub mod experiments;
pub mod fitting;
pub mod logger;
pub mod model;
pub mod organs;
pub mod pk;
pub mod settings;
pub mod simulator;
pub mod units;

pub use error::PbpkError;
pub use model::{CompositeModel, ModelDefinition, ModelError};
pub use organs::{body, whole_body};
pub use pk::{calculate_pk, ConcentrationCurve, PkOptions, PkParameters};
pub use settings::Settings;
pub use simulator::{SimulationError, Simulator, SolverOptions, Timecourse, TimecourseSim, Trajectory};
pub use units::{Quantity, UnitCatalogue};

pub mod prelude {
    pub mod model {
        pub use crate::model::{
            AssignmentRule, Compartment, CompositeModel, Element, ElementKind, Expr,
            ModelDefinition, ModelError, Parameter, RateRule, Reaction, Species,
        };
    }
    pub mod organs {
        pub use crate::organs::{
            body, intestine, kidney, liver, whole_body, Substance, INTESTINE, KIDNEY, LIVER,
            SUBSTANCES,
        };
    }
    pub mod simulator {
        pub use crate::simulator::{
            logspace, ScanSim, SimulationError, Simulator, SolverOptions, Timecourse,
            TimecourseSim, Trajectory,
        };
    }
    pub mod pk {
        pub use crate::pk::{
            calculate_pk, AUCMethod, ConcentrationCurve, PkError, PkOptions, PkParameters,
            PkWarning, TerminalOptions,
        };
    }

    pub use crate::error::PbpkError;
    pub use crate::organs::whole_body;
    pub use crate::pk::{calculate_pk, ConcentrationCurve, PkOptions};
    pub use crate::simulator::{Simulator, SolverOptions, Timecourse, TimecourseSim};
    pub use crate::units::{Quantity, UnitCatalogue};

    /// Build a change set for a timecourse segment
    ///
    /// ```ignore
    /// let changes = changes!["PODOSE_sor" => 400.0, "f_cirrhosis" => 0.4];
    /// let tc = Timecourse::new(0.0, 1440.0, 200).with_changes(&changes);
    /// ```
    #[macro_export]
    macro_rules! changes {
        ($($k:expr => $v:expr),* $(,)?) => {{
            #[allow(unused_mut)]
            let mut changes = std::collections::BTreeMap::<String, f64>::new();
            $(changes.insert(($k).to_string(), $v);)*
            changes
        }};
    }
}
