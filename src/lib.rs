//! Rewrites a function containing suspension points into a resumable state
//! machine whose type is determined by the function's declared return type.
//!
//! The engine works on `syn` syntax trees and is driven by the
//! `#[resumable]` attribute in `stateful-macros`, but it can be called
//! directly:
//!
//! ```
//! let item: syn::ItemFn = syn::parse_quote! {
//!     fn fetch(id: u32) -> impl Future<Output = Result<u32, Error>> {
//!         let value = lookup(id).await?;
//!         Ok(value + 1)
//!     }
//! };
//!
//! let transformed = stateful::transform(&item, &stateful::Directives::new()).unwrap();
//! assert_eq!(transformed.analysis.mar.suspension_points.len(), 1);
//! ```

#[macro_use]
extern crate log;

pub mod config;
pub mod directive;
pub mod error;
pub mod mar;
pub mod signature;
pub mod strategy;

use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::spanned::Spanned;
use syn::{Ident, ItemEnum, ItemFn, Type};

use crate::mar::analysis::{CaptureSet, Initialization, Liveness};
use crate::mar::repr::{Mar, SuspensionId};
use crate::mar::transform::{PassManager, RemoveDeadBlocks, SimplifyCfg, Validate};
use crate::signature::SignatureInfo;

pub use crate::config::Config;
pub use crate::directive::{Directive, Directives};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::signature::{AliasTable, CapabilityKind};
pub use crate::strategy::Strategy;

/// Everything learned about a function before code is generated.
pub struct Analysis {
    pub signature: SignatureInfo,
    pub strategy: Strategy,
    pub mar: Mar,
    pub liveness: Liveness,
    pub init: Initialization,
    pub captures: CaptureSet,
}

impl Analysis {
    /// The names stored across suspension point `point`, in declaration
    /// order. `None` if the point was unreachable.
    pub fn capture_names(&self, point: usize) -> Option<Vec<String>> {
        self.captures.get(SuspensionId::new(point)).map(|captures| {
            captures
                .iter()
                .map(|capture| capture.ident.to_string())
                .collect()
        })
    }
}

/// A transformed function and the state type synthesized for it.
pub struct Transformed {
    /// The rewritten function. Its body defines the state type.
    pub item: ItemFn,
    /// A copy of the state type, for inspection.
    pub state: ItemEnum,
    pub analysis: Analysis,
}

impl ToTokens for Transformed {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        self.item.to_tokens(tokens);
    }
}

/// Transforms `item` with the default configuration.
pub fn transform(item: &ItemFn, directives: &Directives) -> Result<Transformed> {
    Transform::new(item).directives(directives.clone()).run()
}

/// A configurable transformation of one function.
pub struct Transform<'a> {
    item: &'a ItemFn,
    directives: Directives,
    config: Config,
    aliases: AliasTable,
}

impl<'a> Transform<'a> {
    pub fn new(item: &'a ItemFn) -> Self {
        Transform {
            item,
            directives: Directives::new(),
            config: Config::default(),
            aliases: AliasTable::new(),
        }
    }

    pub fn directives(mut self, directives: Directives) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers the bound of a named alias return type.
    pub fn alias(mut self, name: &Ident, bound: Type) -> Self {
        self.aliases.insert(name, bound);
        self
    }

    /// Runs every check without generating code. Fails with the first
    /// error found.
    pub fn analyze(&self) -> Result<Analysis> {
        let item = self.item;

        if let Some(asyncness) = &item.sig.asyncness {
            return Err(Error::AlreadyAsync { span: asyncness.span });
        }
        if let Some(constness) = &item.sig.constness {
            return Err(Error::ConstFn { span: constness.span });
        }

        debug!("analyze: `{}`", item.sig.ident);

        let directives = self.directives.resolve()?;
        let signature = signature::analyze(&item.sig.output, &self.aliases, directives.bound.as_ref())?;
        let strategy = strategy::select(&directives, &signature)?;

        let capability = signature.capability.kind();
        let extraction = mar::extract::extract(&item.block, capability)?;
        let mut mar = mar::build::construct(item, capability, extraction)?;

        let mut passes = PassManager::new();
        if self.config.simplify_cfg {
            passes.add_pass(Box::new(SimplifyCfg::new()));
        }
        passes.add_pass(Box::new(RemoveDeadBlocks::new()));
        passes.add_pass(Box::new(Validate));
        passes.run(&mut mar)?;

        if let Some(dir) = &self.config.dump_cfg {
            if let Err(err) = mar::dump::dump_graphviz(&mar, dir) {
                warn!("could not dump the control flow graph of `{}`: {}", mar.ident, err);
            }
        }

        let liveness = Liveness::compute(&mar);
        let init = Initialization::compute(&mar);
        let captures = CaptureSet::compute(&mar, &liveness, &init);

        captures.validate(&mar, &signature.lifetimes)?;
        strategy::validate(strategy, &mar, &captures)?;

        Ok(Analysis {
            signature,
            strategy,
            mar,
            liveness,
            init,
            captures,
        })
    }

    pub fn run(&self) -> Result<Transformed> {
        let analysis = self.analyze()?;

        let translation = mar::translate::translate(
            self.item,
            &analysis.mar,
            &analysis.signature,
            analysis.strategy,
            &analysis.liveness,
            &analysis.init,
            &analysis.captures,
        )?;

        info!(
            "transformed `{}` into a {} {} with {} suspension points",
            self.item.sig.ident,
            analysis.strategy,
            analysis.signature.capability.kind(),
            analysis.captures.len()
        );

        Ok(Transformed {
            item: translation.item,
            state: translation.state,
            analysis,
        })
    }
}

/// Reports a transformation failure against `item`, for front ends that
/// accept any item.
pub fn not_a_function<T: Spanned>(item: &T) -> Error {
    Error::NotAFunction { span: item.span() }
}
