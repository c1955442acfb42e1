use std::path::Path;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{Context, Result, bail};
use moc_contracts::builtin::MAP_OF_CRYPTO;
use moc_contracts::{
    BatchMode, BindingFactory, BoundContract, DeploymentPlan, DeploymentSequencer,
    PurchaseFeedback, PurchaseOrchestrator, RecordsTarget, SequencerError, Storefront,
    TxEventKind,
};
use moc_core::{NotificationStore, NotificationType};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use crate::context::AppContext;

pub async fn deploy(ctx: &AppContext, plan: Option<&Path>, reuse: bool) -> Result<()> {
    let plan = match plan {
        Some(path) => DeploymentPlan::load(path)?,
        None => DeploymentPlan::default_plan(),
    };
    let steps = plan.into_steps(ctx.registry())?;

    let mut sequencer = DeploymentSequencer::new(ctx.factory(), ctx.identity.clone());
    if let Some(path) = ctx.records_path()? {
        sequencer = sequencer.with_records(RecordsTarget {
            path,
            reuse_unchanged: reuse,
        });
    }

    match sequencer.run(steps).await {
        Ok(deployed) => {
            for entry in deployed.entries() {
                let address = entry
                    .contract
                    .address()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let note = if entry.reused { " (reused)" } else { "" };
                println!("{:<16} {address}{note}", entry.name);
            }
            Ok(())
        }
        Err(SequencerError::Aborted(aborted)) => {
            error!(step = %aborted.step, "{}", aborted.cause);
            for entry in aborted.partial.entries() {
                let address = entry
                    .contract
                    .address()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                println!("{:<16} {address} (confirmed before abort)", entry.name);
            }
            Err(aborted.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// The storefront to buy from: an explicit address, or the recorded
/// deployment on this network.
fn storefront_contract(ctx: &AppContext, address: Option<Address>) -> Result<BoundContract> {
    let factory: BindingFactory = ctx.factory();
    match address {
        Some(address) => {
            let descriptor = ctx.registry().require(MAP_OF_CRYPTO)?;
            Ok(factory.attach(descriptor, address, ctx.identity.clone()))
        }
        None => {
            let records = ctx.records()?;
            let contract = records
                .attach(MAP_OF_CRYPTO, ctx.registry(), ctx.identity.clone())
                .with_context(|| {
                    format!(
                        "No {MAP_OF_CRYPTO} deployment recorded for {}; run `moc deploy` or pass --address",
                        ctx.config.network
                    )
                })?;
            Ok(contract)
        }
    }
}

pub async fn purchases(
    ctx: &AppContext,
    address: Option<Address>,
    merchant: u64,
    product: u64,
    count: usize,
    mode: BatchMode,
) -> Result<()> {
    let contract = storefront_contract(ctx, address)?;

    let mut events = ctx.submitter.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.kind {
                    TxEventKind::Pending => info!(submission = event.submission, tx = ?event.tx, "pending"),
                    TxEventKind::Confirmed => info!(submission = event.submission, tx = ?event.tx, "confirmed"),
                    TxEventKind::Failed(reason) => {
                        info!(submission = event.submission, tx = ?event.tx, "failed: {reason}")
                    }
                },
                Err(RecvError::Lagged(skipped)) => info!(skipped, "progress events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = PurchaseOrchestrator::new(&ctx.submitter)
        .with_mode(mode)
        .run_batch(&contract, &[(merchant, product)], count)
        .await;
    progress.abort();

    for outcome in &report.outcomes {
        let tx = outcome.tx.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        match &outcome.result {
            Ok(_) => println!("#{:<3} ok      {tx}", outcome.index),
            Err(e) => println!("#{:<3} failed  {tx}  {e}", outcome.index),
        }
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded().count(),
        report.failed().count()
    );
    Ok(())
}

pub async fn buy(
    ctx: &AppContext,
    address: Option<Address>,
    merchant: u64,
    product: u64,
) -> Result<()> {
    let contract = storefront_contract(ctx, address)?;
    let notifications = Arc::new(Mutex::new(NotificationStore::new()));
    let storefront = Storefront::new(
        Arc::clone(&ctx.submitter),
        ctx.network.clone(),
        Arc::clone(&notifications),
    );

    println!("Waiting for acceptance...");
    let feedback = storefront.buy(&contract, merchant, product).await;

    if let Some(shown) = notifications.lock().all().first() {
        let marker = match shown.notification_type {
            NotificationType::Loading => "…",
            NotificationType::Success => "✔",
            NotificationType::Error => "✘",
        };
        match &shown.link {
            Some(link) => println!("{marker} {} {link}", shown.message),
            None => println!("{marker} {}", shown.message),
        }
    }

    match feedback {
        PurchaseFeedback::Error(message) => bail!(message),
        PurchaseFeedback::Success { tx, link: None } => {
            println!("tx {tx}");
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn interface(ctx: &AppContext, kind: &str) -> Result<()> {
    let descriptor = ctx.registry().require(kind)?;
    let view = BindingFactory::create_interface_view(&descriptor);

    println!("{kind}{}", if descriptor.is_deployable() { "" } else { " (interface only)" });
    if !view.constructor_inputs().is_empty() {
        println!("  constructor({})", view.constructor_inputs().join(", "));
    }
    for method in &view.methods {
        let outputs = if method.outputs.is_empty() {
            String::new()
        } else {
            format!(" -> ({})", method.outputs.join(", "))
        };
        println!(
            "  {}{outputs} [{}]",
            method.signature(),
            format!("{:?}", method.mutability).to_lowercase()
        );
    }
    for err in &view.errors {
        println!("  error {}({})", err.name, err.inputs.join(", "));
    }
    Ok(())
}

pub fn addresses(ctx: &AppContext) -> Result<()> {
    let records = ctx.records()?;
    if records.is_empty() {
        println!("No deployments recorded for {}", ctx.config.network);
        return Ok(());
    }
    for (name, record) in records.iter() {
        println!(
            "{name:<16} {} {} {}",
            record.address,
            record.contract,
            record.deployed_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
