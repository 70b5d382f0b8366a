//! Build orchestration: collect UTXOs, encode the payload, select inputs,
//! assemble the stampchain-ordered output list, reconcile change and emit a
//! PSBT for an external signer.
//!
//! Output ordering is a first-class invariant:
//! * SRC-20 DEPLOY / MINT: dust anchor to the sender, data chunks, change.
//! * SRC-20 TRANSFER: dust anchor to the recipient, data chunks, change.
//! * Stamp issuance: OP_RETURN with the obfuscated Counterparty message,
//!   image chunks, change.
//!
//! Change, when present, is always last.

use std::sync::Arc;

use bitcoin::{Address, Amount, Network, Psbt, Script, ScriptBuf, TxOut};

use crate::constants::{SRC20_ANCHOR_VALUE, STAMP_DUST};
use crate::encoder::counterparty::{self, CounterpartyIssuance};
use crate::encoder::p2wsh;
use crate::encoder::src20::{self, Src20EncodeOptions, Src20Encoding, Src20Payload};
use crate::error::{BuildError, FailureReason, SelectionFailure};
use crate::fee::{dust_threshold_for, fee_for};
use crate::optimizer::{OptimizedPayload, Optimizer};
use crate::protection::ProtectionOracle;
use crate::provider::UtxoProvider;
use crate::selector::{BranchAndBoundSelector, UtxoSelector};
use crate::size::{op_return_script_len, tx_vsize, InputKind, OutputKind};
use crate::types::{CancellationToken, Selection, SelectionOptions, TransactionDraft, Utxo};

/// States of a build, traversed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Fetching the wallet view and fee rates.
    Collecting,
    /// Shaping the payload into outputs.
    Encoding,
    /// Running UTXO selection.
    Selecting,
    /// Composing outputs and reconciling change.
    Assembling,
    /// Producing the PSBT.
    Emitting,
}

impl core::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            BuildStage::Collecting => "collecting",
            BuildStage::Encoding => "encoding",
            BuildStage::Selecting => "selecting",
            BuildStage::Assembling => "assembling",
            BuildStage::Emitting => "emitting",
        };
        f.write_str(s)
    }
}

/// One recorded state transition, with the completed stage's output summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Stage that completed.
    pub stage: BuildStage,
    /// What it produced.
    pub detail: String,
}

/// A stamp issuance to build.
#[derive(Debug, Clone)]
pub struct StampIssuanceRequest {
    /// Funding and change address.
    pub source: Address,
    /// The Counterparty issuance anchoring the stamp.
    pub issuance: CounterpartyIssuance,
    /// Image bytes committed across P2WSH outputs.
    pub image: Vec<u8>,
    /// Fee rate in sat/vB; the provider's medium tier when absent.
    pub fee_rate: Option<u64>,
    /// Run the payload optimizer over the image.
    pub optimize: bool,
}

/// An SRC-20 operation to build.
#[derive(Debug, Clone)]
pub struct Src20Request {
    /// Funding and change address.
    pub sender: Address,
    /// Anchor target for TRANSFER; ignored for DEPLOY and MINT.
    pub recipient: Option<Address>,
    /// The token operation.
    pub payload: Src20Payload,
    /// Fee rate in sat/vB; the provider's medium tier when absent.
    pub fee_rate: Option<u64>,
    /// Compression and msgpack knobs.
    pub encode_options: Src20EncodeOptions,
}

/// A finished build: the draft, its PSBT and the bookkeeping around them.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// Inputs, ordered outputs, fee and change bookkeeping.
    pub draft: TransactionDraft,
    /// Unsigned PSBT with witness UTXOs populated.
    pub psbt: Psbt,
    /// The reconciled selection behind the draft.
    pub selection: Selection,
    /// Fee rate the build used, in sat/vB.
    pub fee_rate: u64,
    /// Stage trail, in transition order.
    pub stages: Vec<StageRecord>,
    /// SRC-20 encoding details, for SRC-20 builds.
    pub src20: Option<Src20Encoding>,
    /// Optimizer outcome, for stamp builds that asked for it.
    pub optimized: Option<OptimizedPayload>,
}

/// Transaction builder over an external provider.
///
/// Setter methods consume and return the builder so calls chain; `build_*`
/// methods borrow it, so one configured builder serves many requests.
#[derive(Debug)]
pub struct TxBuilder<'a, P> {
    provider: &'a P,
    selector: Box<dyn UtxoSelector>,
    network: Network,
    long_term_fee_rate: Option<u64>,
    max_inputs: Option<u32>,
    min_confirmations: Option<u32>,
    oracle: Option<Arc<dyn ProtectionOracle>>,
    cancel: Option<CancellationToken>,
    optimizer: Optimizer,
}

impl<'a, P: UtxoProvider> TxBuilder<'a, P> {
    /// A builder with the deterministic default selector.
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            selector: Box::new(BranchAndBoundSelector),
            network: Network::Bitcoin,
            long_term_fee_rate: None,
            max_inputs: None,
            min_confirmations: None,
            oracle: None,
            cancel: None,
            optimizer: Optimizer::new(),
        }
    }

    /// Use a specific selection algorithm.
    pub fn selector(mut self, selector: Box<dyn UtxoSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Target network; governs dust floors.
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Long-term fee rate for waste and dust decisions.
    pub fn long_term_fee_rate(mut self, rate: u64) -> Self {
        self.long_term_fee_rate = Some(rate);
        self
    }

    /// Cap the number of inputs.
    pub fn max_inputs(mut self, max: u32) -> Self {
        self.max_inputs = Some(max);
        self
    }

    /// Require confirmations on selected UTXOs.
    pub fn min_confirmations(mut self, min: u32) -> Self {
        self.min_confirmations = Some(min);
        self
    }

    /// Protect flagged UTXOs from selection.
    pub fn oracle(mut self, oracle: Arc<dyn ProtectionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Honor a cancellation token at every suspension point.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancel(&self, stage: &'static str) -> Result<(), BuildError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(BuildError::Cancelled { stage });
        }
        Ok(())
    }

    /// Fee share of the data outputs beyond the single payment output the
    /// selectors budget for. Folding it into the target keeps the selection
    /// funded for the real output mix; assembly then reconciles exactly.
    fn provisional_data_fee(outputs: &[TxOut], fee_rate: u64) -> u64 {
        let output_kinds: Vec<OutputKind> = outputs
            .iter()
            .map(|o| output_kind(&o.script_pubkey))
            .collect();
        fee_for(&[], &output_kinds, fee_rate) - fee_for(&[], &[OutputKind::P2wpkh], fee_rate)
    }

    fn selection_options(&self, target_value: u64, fee_rate: u64) -> SelectionOptions {
        SelectionOptions {
            target_value,
            fee_rate,
            max_inputs: self.max_inputs,
            min_confirmations: self.min_confirmations,
            dust_threshold: None,
            long_term_fee_rate: self.long_term_fee_rate,
            oracle: self.oracle.clone(),
            consolidate: false,
            rng_seed: None,
            cancel: self.cancel.clone(),
        }
    }

    fn collect(
        &self,
        address: &Address,
        fee_rate: Option<u64>,
        stages: &mut Vec<StageRecord>,
    ) -> Result<(Vec<Utxo>, u64), BuildError> {
        self.check_cancel("collecting")?;
        let utxos = self.provider.get_utxos(&address.to_string())?;

        self.check_cancel("collecting")?;
        let fee_rate = match fee_rate {
            Some(rate) => rate,
            None => self.provider.get_fee_rates()?.medium,
        };

        record(
            stages,
            BuildStage::Collecting,
            format!("{} UTXOs at {fee_rate} sat/vB", utxos.len()),
        );
        Ok((utxos, fee_rate))
    }

    fn run_selection(
        &self,
        utxos: &[Utxo],
        options: &SelectionOptions,
        stages: &mut Vec<StageRecord>,
    ) -> Result<Selection, BuildError> {
        self.check_cancel("selecting")?;
        let selection = self
            .selector
            .select(utxos, options)
            .map_err(translate_insufficiency)?;
        record(
            stages,
            BuildStage::Selecting,
            format!(
                "{} inputs totalling {} sats via {}",
                selection.input_count,
                selection.total_value,
                self.selector.name()
            ),
        );
        Ok(selection)
    }

    /// Build an SRC-20 DEPLOY, MINT or TRANSFER transaction.
    pub fn build_src20(&self, request: Src20Request) -> Result<BuiltTransaction, BuildError> {
        let mut stages = Vec::new();
        let (utxos, fee_rate) = self.collect(&request.sender, request.fee_rate, &mut stages)?;

        self.check_cancel("encoding")?;
        let encoding = src20::encode(&request.payload, request.encode_options)?;
        record(
            &mut stages,
            BuildStage::Encoding,
            format!(
                "{} {} into {} chunks (compressed: {})",
                request.payload.op(),
                request.payload.tick(),
                encoding.chunks.len(),
                encoding.compressed
            ),
        );

        // The anchor leads the outputs: sender for DEPLOY and MINT,
        // recipient for TRANSFER.
        let anchor_script = match (&request.payload, &request.recipient) {
            (Src20Payload::Transfer { .. }, Some(recipient)) => recipient.script_pubkey(),
            _ => request.sender.script_pubkey(),
        };

        let mut outputs: Vec<TxOut> = vec![TxOut {
            value: Amount::from_sat(SRC20_ANCHOR_VALUE),
            script_pubkey: anchor_script,
        }];
        for chunk in &encoding.chunks {
            outputs.push(TxOut {
                value: Amount::from_sat(STAMP_DUST),
                script_pubkey: p2wsh::witness_script(chunk),
            });
        }

        let outputs_value: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
        let target_value = outputs_value + Self::provisional_data_fee(&outputs, fee_rate);
        let options = self.selection_options(target_value, fee_rate);
        let selection = self.run_selection(&utxos, &options, &mut stages)?;

        let built = self.assemble(
            selection,
            outputs,
            request.sender.script_pubkey(),
            fee_rate,
            stages,
        )?;
        Ok(BuiltTransaction {
            src20: Some(encoding),
            ..built
        })
    }

    /// Build a stamp issuance transaction.
    pub fn build_stamp_issuance(
        &self,
        request: StampIssuanceRequest,
    ) -> Result<BuiltTransaction, BuildError> {
        let mut stages = Vec::new();
        let (utxos, fee_rate) = self.collect(&request.source, request.fee_rate, &mut stages)?;

        self.check_cancel("encoding")?;
        let optimized = request
            .optimize
            .then(|| self.optimizer.optimize(&request.image));
        let image: &[u8] = optimized
            .as_ref()
            .map_or(request.image.as_slice(), |payload| &payload.data);
        let chunks = p2wsh::chunk_payload(image);
        // Validates the issuance up front; the real OP_RETURN needs the
        // first input's txid and is written after selection.
        let issuance_len =
            crate::constants::CNTRPRTY_MAGIC.len() + request.issuance.encode()?.len();
        record(
            &mut stages,
            BuildStage::Encoding,
            format!("{} image bytes into {} chunks", image.len(), chunks.len()),
        );

        let mut outputs: Vec<TxOut> = Vec::with_capacity(chunks.len() + 1);
        outputs.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::from_bytes(vec![0x6a; op_return_script_len(issuance_len)]),
        });
        for chunk in &chunks {
            outputs.push(TxOut {
                value: Amount::from_sat(STAMP_DUST),
                script_pubkey: p2wsh::witness_script(chunk),
            });
        }

        let outputs_value: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
        let target_value = outputs_value + Self::provisional_data_fee(&outputs, fee_rate);
        let options = self.selection_options(target_value, fee_rate);
        let selection = self.run_selection(&utxos, &options, &mut stages)?;

        // The RC4 keystream is keyed by the first input's txid.
        let first_txid = selection.inputs[0].txid;
        outputs[0].script_pubkey = counterparty::op_return_script(&request.issuance, &first_txid)?;

        let built = self.assemble(
            selection,
            outputs,
            request.source.script_pubkey(),
            fee_rate,
            stages,
        )?;
        Ok(BuiltTransaction { optimized, ..built })
    }

    /// Compose the final output list, reconcile change against the exact fee
    /// and emit the PSBT.
    fn assemble(
        &self,
        mut selection: Selection,
        mut outputs: Vec<TxOut>,
        change_script: ScriptBuf,
        fee_rate: u64,
        mut stages: Vec<StageRecord>,
    ) -> Result<BuiltTransaction, BuildError> {
        self.check_cancel("assembling")?;

        let input_kinds: Vec<InputKind> = selection.inputs.iter().map(Utxo::input_kind).collect();
        let mut output_kinds: Vec<OutputKind> = outputs
            .iter()
            .map(|o| output_kind(&o.script_pubkey))
            .collect();
        let change_kind = output_kind(&change_script);

        let target_value: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
        let dust = dust_threshold_for(self.network, change_kind, fee_rate);

        output_kinds.push(change_kind);
        let fee_with_change = fee_for(&input_kinds, &output_kinds, fee_rate);
        output_kinds.pop();

        let remainder = selection.total_value - target_value;
        let change_index = if remainder >= fee_with_change + dust {
            let change_value = remainder - fee_with_change;
            outputs.push(TxOut {
                value: Amount::from_sat(change_value),
                script_pubkey: change_script,
            });
            output_kinds.push(change_kind);
            selection.change = change_value;
            selection.fee = fee_with_change;
            Some(outputs.len() - 1)
        } else {
            // Dusty remainder is absorbed into fee.
            selection.change = 0;
            selection.fee = remainder;
            None
        };

        selection.output_count = outputs.len() as u32;
        selection.estimated_vsize = tx_vsize(&input_kinds, &output_kinds);
        selection.effective_fee_rate = selection.fee as f64 / selection.estimated_vsize as f64;
        record(
            &mut stages,
            BuildStage::Assembling,
            format!(
                "{} outputs, fee {} sats, change {} sats",
                outputs.len(),
                selection.fee,
                selection.change
            ),
        );

        self.check_cancel("emitting")?;
        let draft = TransactionDraft {
            inputs: selection.inputs.clone(),
            outputs,
            fee: selection.fee,
            change_index,
        };
        let mut psbt = Psbt::from_unsigned_tx(draft.unsigned_tx())?;
        for (input, psbt_input) in selection.inputs.iter().zip(psbt.inputs.iter_mut()) {
            if input.input_kind().has_witness() {
                psbt_input.witness_utxo = Some(TxOut {
                    value: Amount::from_sat(input.value),
                    script_pubkey: input.script_pubkey.clone(),
                });
            }
        }
        record(
            &mut stages,
            BuildStage::Emitting,
            format!("psbt with {} inputs", psbt.inputs.len()),
        );

        Ok(BuiltTransaction {
            draft,
            psbt,
            selection,
            fee_rate,
            stages,
            src20: None,
            optimized: None,
        })
    }
}

fn record(stages: &mut Vec<StageRecord>, stage: BuildStage, detail: String) {
    tracing::debug!(%stage, %detail, "build stage complete");
    stages.push(StageRecord { stage, detail });
}

fn output_kind(script: &Script) -> OutputKind {
    if script.is_op_return() {
        OutputKind::OpReturn {
            data_len: script.len().saturating_sub(2),
        }
    } else if script.is_p2wpkh() {
        OutputKind::P2wpkh
    } else if script.is_p2wsh() {
        OutputKind::P2wsh
    } else if script.is_p2tr() {
        OutputKind::P2tr
    } else if script.is_p2sh() {
        OutputKind::P2sh
    } else {
        OutputKind::P2pkh
    }
}

/// Translate a selector's insufficiency into the user-visible build error
/// carrying `{available, required}`; everything else surfaces unchanged.
fn translate_insufficiency(failure: SelectionFailure) -> BuildError {
    if failure.reason == FailureReason::InsufficientFunds {
        if let (Some(available), Some(required)) = (failure.available(), failure.required()) {
            return BuildError::InsufficientFunds {
                available,
                required,
            };
        }
    }
    BuildError::Selection(failure)
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;
    use crate::provider::testutil::StaticProvider;
    use crate::selector::testutil::utxo;
    use crate::types::FeeRates;

    fn sender() -> Address {
        Address::from_str("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .unwrap()
            .require_network(Network::Bitcoin)
            .unwrap()
    }

    fn provider_with(values: &[u64]) -> StaticProvider {
        StaticProvider {
            utxos: values
                .iter()
                .enumerate()
                .map(|(i, &value)| utxo(value, i as u8 + 1))
                .collect(),
            fee_rates: Some(FeeRates {
                low: 2,
                medium: 10,
                high: 30,
                urgent: 60,
            }),
        }
    }

    fn deploy_request(fee_rate: Option<u64>) -> Src20Request {
        Src20Request {
            sender: sender(),
            recipient: None,
            payload: Src20Payload::Deploy {
                tick: "TEST".into(),
                max: "1000000".into(),
                lim: "1000".into(),
                dec: 0,
            },
            fee_rate,
            encode_options: Src20EncodeOptions::default(),
        }
    }

    #[test]
    fn deploy_orders_anchor_chunks_change() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap();

        let outputs = &built.draft.outputs;
        assert_eq!(outputs[0].value.to_sat(), 330);
        assert_eq!(outputs[0].script_pubkey, sender().script_pubkey());

        let chunk_run = &outputs[1..outputs.len() - 1];
        assert!(chunk_run.len() >= 2);
        assert!(chunk_run.iter().all(|o| o.script_pubkey.is_p2wsh()));
        assert!(chunk_run.iter().all(|o| o.value.to_sat() == 330));

        assert_eq!(built.draft.change_index, Some(outputs.len() - 1));
        assert_eq!(
            outputs.last().unwrap().script_pubkey,
            sender().script_pubkey()
        );
        assert!(!outputs.iter().any(|o| o.script_pubkey.is_op_return()));
    }

    #[test]
    fn transfer_anchors_to_the_recipient() {
        let recipient = {
            use bitcoin::hashes::Hash;
            let script =
                ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::from_byte_array([0x42; 20]));
            Address::from_script(&script, Network::Bitcoin).unwrap()
        };
        let provider = provider_with(&[100_000]);
        let request = Src20Request {
            sender: sender(),
            recipient: Some(recipient.clone()),
            payload: Src20Payload::Transfer {
                tick: "TEST".into(),
                amt: "10".into(),
            },
            fee_rate: Some(10),
            encode_options: Src20EncodeOptions::default(),
        };
        let built = TxBuilder::new(&provider).build_src20(request).unwrap();

        let outputs = &built.draft.outputs;
        assert_eq!(outputs[0].script_pubkey, recipient.script_pubkey());
        assert_eq!(outputs[0].value.to_sat(), 330);
        assert_eq!(
            outputs.last().unwrap().script_pubkey,
            sender().script_pubkey()
        );
    }

    #[test]
    fn src20_payload_survives_the_wire() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap();

        let decoded = src20::decode_outputs(&built.draft.outputs).unwrap();
        assert_eq!(
            decoded,
            Src20Payload::Deploy {
                tick: "TEST".into(),
                max: "1000000".into(),
                lim: "1000".into(),
                dec: 0,
            }
        );
    }

    #[test]
    fn stamp_issuance_leads_with_the_op_return() {
        let provider = provider_with(&[200_000]);
        let issuance = CounterpartyIssuance {
            asset_id: 95428956661682177,
            quantity: 1,
            divisible: false,
            lock: true,
            description: "STAMP:test".into(),
        };
        let request = StampIssuanceRequest {
            source: sender(),
            issuance: issuance.clone(),
            image: vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4],
            fee_rate: Some(5),
            optimize: false,
        };
        let built = TxBuilder::new(&provider)
            .build_stamp_issuance(request)
            .unwrap();

        let outputs = &built.draft.outputs;
        assert!(outputs[0].script_pubkey.is_op_return());
        assert_eq!(outputs[0].value.to_sat(), 0);

        let decoded = counterparty::decode_op_return(
            &outputs[0].script_pubkey,
            &built.draft.inputs[0].txid,
        )
        .unwrap();
        assert_eq!(decoded, issuance);

        assert!(outputs[1].script_pubkey.is_p2wsh());
        assert_eq!(built.draft.change_index, Some(outputs.len() - 1));
    }

    #[test]
    fn fee_rate_defaults_to_the_medium_tier() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(None))
            .unwrap();
        assert_eq!(built.fee_rate, 10);
    }

    #[test]
    fn stage_trail_is_ordered() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap();
        let stages: Vec<BuildStage> = built.stages.iter().map(|record| record.stage).collect();
        assert_eq!(
            stages,
            vec![
                BuildStage::Collecting,
                BuildStage::Encoding,
                BuildStage::Selecting,
                BuildStage::Assembling,
                BuildStage::Emitting,
            ]
        );
    }

    #[test]
    fn balance_invariant_holds_after_reconciliation() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap();

        let outputs_total: u64 = built.draft.outputs.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(
            built.selection.total_value,
            outputs_total + built.selection.fee
        );
        assert!(built.selection.effective_fee_rate >= 10.0);
    }

    #[test]
    fn dusty_change_is_absorbed_into_fee() {
        // One UTXO whose remainder after outputs and fee lands under dust.
        let target_outputs = 330 + 3 * 330; // anchor + three data chunks
        let input_kinds = [InputKind::P2wpkh];
        let output_kinds = [
            OutputKind::P2wpkh,
            OutputKind::P2wsh,
            OutputKind::P2wsh,
            OutputKind::P2wsh,
            OutputKind::P2wpkh,
        ];
        let fee_with_change = fee_for(&input_kinds, &output_kinds, 1);
        let provider = provider_with(&[target_outputs + fee_with_change + 50]);

        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(1)))
            .unwrap();
        assert_eq!(built.selection.change, 0);
        assert_eq!(built.draft.change_index, None);
        assert_eq!(built.selection.fee, fee_with_change + 50);
        let outputs_total: u64 = built.draft.outputs.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(
            built.selection.total_value,
            outputs_total + built.selection.fee
        );
    }

    #[test]
    fn insufficient_wallet_reports_available_and_required() {
        let provider = provider_with(&[500]);
        let err = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap_err();
        match err {
            BuildError::InsufficientFunds {
                available,
                required,
            } => {
                assert_eq!(available, 500);
                assert!(required > available);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_stops_the_build_early() {
        let token = CancellationToken::new();
        token.cancel();
        let provider = provider_with(&[100_000]);
        let err = TxBuilder::new(&provider)
            .cancellation(token)
            .build_src20(deploy_request(Some(10)))
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled { stage: "collecting" }));
    }

    #[test]
    fn psbt_carries_witness_utxos() {
        let provider = provider_with(&[100_000]);
        let built = TxBuilder::new(&provider)
            .build_src20(deploy_request(Some(10)))
            .unwrap();
        assert_eq!(built.psbt.inputs.len(), 1);
        let witness_utxo = built.psbt.inputs[0].witness_utxo.as_ref().unwrap();
        assert_eq!(witness_utxo.value.to_sat(), 100_000);
        assert_eq!(
            built.psbt.unsigned_tx.output.len(),
            built.draft.outputs.len()
        );
    }
}
