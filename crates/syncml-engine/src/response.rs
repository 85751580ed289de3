//! Outbound message generation: queued statuses and packages drained into
//! size-bounded messages.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::SyncError;
use crate::packages::{Package, PackageContext};
use syncml_wire::consts::E_SYNCHDR;
use syncml_wire::{
    build, ChalParams, CommandParams, HeaderParams, MapParams, Message, ProtocolVersion, PutParams,
    ResultsParams, StatusCode, StatusParams, SyncParams,
};

/// Share of the negotiated maximum message size actually budgeted; the
/// estimator is coarse, the margin absorbs it.
const MAX_MSG_SIZE_THRESHOLD: f64 = 0.9;

#[derive(Default)]
pub struct ResponseGenerator {
    header_params: HeaderParams,
    remote_msg_id: u32,
    msg_id: u32,
    statuses: VecDeque<StatusParams>,
    packages: VecDeque<Package>,
    ignore_statuses: bool,
}

impl ResponseGenerator {
    pub fn new() -> ResponseGenerator {
        ResponseGenerator::default()
    }

    pub fn header_params(&self) -> &HeaderParams {
        &self.header_params
    }

    pub fn set_header_params(&mut self, header_params: HeaderParams) {
        self.header_params = header_params;
    }

    pub fn set_remote_msg_id(&mut self, remote_msg_id: u32) {
        self.remote_msg_id = remote_msg_id;
    }

    pub fn remote_msg_id(&self) -> u32 {
        self.remote_msg_id
    }

    /// Drop all queued command statuses; challenge-bearing header statuses
    /// are still let through.
    pub fn set_ignore_statuses(&mut self, ignore: bool) {
        self.ignore_statuses = ignore;
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push_back(package);
    }

    pub fn clear_packages(&mut self) {
        self.packages.clear();
    }

    pub fn package_queue_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn package_queue_len(&self) -> usize {
        self.packages.len()
    }

    pub fn statuses(&self) -> &VecDeque<StatusParams> {
        &self.statuses
    }

    pub fn add_status(&mut self, status: StatusParams) {
        if !self.ignore_statuses {
            self.statuses.push_back(status);
        }
    }

    /// Status for the inbound header.
    pub fn add_status_for_header(&mut self, header: &HeaderParams, code: StatusCode) {
        self.add_status(StatusParams {
            msg_ref: header.msg_id,
            cmd_ref: 0,
            cmd: E_SYNCHDR.to_string(),
            target_ref: header.target_device.clone(),
            source_ref: header.source_device.clone(),
            data: code,
            ..Default::default()
        });
    }

    /// Challenge-bearing header status; bypasses `ignore_statuses`.
    pub fn add_status_for_header_with_chal(
        &mut self,
        header: &HeaderParams,
        chal: ChalParams,
        code: StatusCode,
    ) {
        self.statuses.push_back(StatusParams {
            msg_ref: header.msg_id,
            cmd_ref: 0,
            cmd: E_SYNCHDR.to_string(),
            target_ref: header.target_device.clone(),
            source_ref: header.source_device.clone(),
            data: code,
            chal: Some(chal),
            ..Default::default()
        });
    }

    /// Status for an Alert; echoes the remote's proposed next anchor.
    pub fn add_status_for_alert(&mut self, alert: &CommandParams, code: StatusCode) {
        let item = alert.items.first();
        self.add_status(StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: alert.cmd_id,
            cmd: syncml_wire::consts::E_ALERT.to_string(),
            target_ref: item.map(|i| i.target.clone()).unwrap_or_default(),
            source_ref: item.map(|i| i.source.clone()).unwrap_or_default(),
            data: code,
            next_anchor: alert.anchors().next,
            ..Default::default()
        });
    }

    pub fn add_status_for_sync(&mut self, sync: &SyncParams, code: StatusCode) {
        self.add_status(StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: sync.cmd_id,
            cmd: syncml_wire::consts::E_SYNC.to_string(),
            target_ref: sync.target_database.clone(),
            source_ref: sync.source_database.clone(),
            data: code,
            ..Default::default()
        });
    }

    pub fn add_status_for_map(&mut self, map: &MapParams, code: StatusCode) {
        self.add_status(StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: map.cmd_id,
            cmd: syncml_wire::consts::E_MAP.to_string(),
            target_ref: map.target_database.clone(),
            source_ref: map.source_database.clone(),
            data: code,
            ..Default::default()
        });
    }

    pub fn add_status_for_put(&mut self, put: &PutParams, code: StatusCode) {
        self.add_status(StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: put.cmd_id,
            cmd: syncml_wire::consts::E_PUT.to_string(),
            source_ref: put.devinf.source.clone(),
            data: code,
            ..Default::default()
        });
    }

    pub fn add_status_for_results(&mut self, results: &ResultsParams, code: StatusCode) {
        self.add_status(StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: results.cmd_id,
            cmd: syncml_wire::consts::E_RESULTS.to_string(),
            data: code,
            ..Default::default()
        });
    }

    /// Status for a generic command, referencing all of its items.
    pub fn add_status_for_command(&mut self, command: &CommandParams, code: StatusCode) {
        let indexes: Vec<usize> = (0..command.items.len()).collect();
        self.add_status_for_command_items(command, code, &indexes);
    }

    /// Status for a subset of a command's items, one bucket of the
    /// per-response-code grouping.
    pub fn add_status_for_command_items(
        &mut self,
        command: &CommandParams,
        code: StatusCode,
        item_indexes: &[usize],
    ) {
        let mut status = StatusParams {
            msg_ref: self.remote_msg_id,
            cmd_ref: command.cmd_id,
            cmd: command.command.element_name().to_string(),
            data: code,
            ..Default::default()
        };

        let items: Vec<_> =
            item_indexes.iter().filter_map(|&index| command.items.get(index)).collect();

        if items.len() == 1 {
            status.source_ref = items[0].source.clone();
            status.target_ref = items[0].target.clone();
        } else {
            for item in items {
                status.items.push(syncml_wire::ItemParams {
                    source: item.source.clone(),
                    target: item.target.clone(),
                    ..Default::default()
                });
            }
        }

        self.add_status(status);
    }

    /// Build the next outbound message. A working budget of 90% of
    /// `max_size` is used; statuses drain first, then packages, a package
    /// keeping its place at the head until it reports completion.
    pub fn generate_next_message(
        &mut self,
        max_size: i64,
        version: ProtocolVersion,
        ctx: &mut PackageContext<'_>,
    ) -> Result<Message, SyncError> {
        debug!(msg_id = self.msg_id + 1, "preparing to send next message");

        self.msg_id += 1;
        self.header_params.msg_id = self.msg_id;
        let mut message = Message::new(&self.header_params, version);

        let threshold = (max_size as f64 * MAX_MSG_SIZE_THRESHOLD) as i64;
        let mut remaining = threshold - message.size_estimate() as i64;

        while let Some(mut status) = self.statuses.pop_front() {
            status.cmd_id = message.next_cmd_id();
            let element = build::status(&status);
            remaining -= element.size_estimate() as i64;
            message.add_to_body(element);

            if remaining < 0 {
                break;
            }
        }

        while let Some(package) = self.packages.front_mut() {
            if package.write(&mut message, &mut remaining, ctx)? {
                self.packages.pop_front();
            } else {
                break;
            }
        }

        Ok(message)
    }
}
