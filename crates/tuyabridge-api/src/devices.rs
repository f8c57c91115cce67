// Device directory and command endpoints
//
// Custom projects walk assets -> device ids -> batched info and status,
// then fetch functions per device. Smart Home projects list the
// associated user's devices in one call and batch the function lookup.
// Listing does not check `success`; a failed page surfaces as an empty or
// undecodable result.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::ProjectType;
use crate::client::{CloudClient, query};
use crate::error::Error;
use crate::models::{
    ApiResponse, BatchFunctions, BatchStatus, Device, DeviceFunctions, StatusEntry,
};

/// Maximum ids per batched lookup.
pub const BATCH_SIZE: usize = 20;

/// Split ids into consecutive groups of at most `size`, preserving order.
pub fn chunk_ids(ids: &[String], size: usize) -> Vec<Vec<String>> {
    ids.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}

#[derive(Deserialize)]
struct AssetPage {
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Deserialize)]
struct Asset {
    asset_id: String,
}

#[derive(Deserialize)]
struct DeviceIdPage {
    #[serde(default)]
    list: Vec<DeviceIdEntry>,
}

#[derive(Deserialize)]
struct DeviceIdEntry {
    device_id: String,
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default, alias = "devices")]
    list: Vec<Device>,
}

impl CloudClient {
    /// Enumerate every device visible to the account, with functions and
    /// status merged in.
    pub async fn list_devices(&self) -> Result<Vec<Device>, Error> {
        match self.project() {
            ProjectType::Custom => self.list_devices_custom().await,
            ProjectType::SmartHome => self.list_devices_smart_home().await,
        }
    }

    async fn list_devices_custom(&self) -> Result<Vec<Device>, Error> {
        let page: AssetPage = self
            .get(
                "/v1.0/iot-03/users/assets",
                Some(&query([("page_no", "0"), ("page_size", "100")])),
            )
            .await?
            .result_as()?;

        let mut ids = Vec::new();
        for asset in page.assets {
            let devices: DeviceIdPage = self
                .get(&format!("/v1.0/iot-02/assets/{}/devices", asset.asset_id), None)
                .await?
                .result_as()?;
            ids.extend(devices.list.into_iter().map(|d| d.device_id));
        }
        debug!(count = ids.len(), "resolved device ids from assets");

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut devices = Vec::with_capacity(ids.len());
        let mut statuses: HashMap<String, Vec<StatusEntry>> = HashMap::new();
        for chunk in chunk_ids(&ids, BATCH_SIZE) {
            let q = query([("device_ids", chunk.join(","))]);
            let info: DeviceList = self
                .get("/v1.0/iot-03/devices", Some(&q))
                .await?
                .result_as()?;
            devices.extend(info.list);

            let status: Vec<BatchStatus> = self
                .get("/v1.0/iot-03/devices/status", Some(&q))
                .await?
                .result_as()?;
            statuses.extend(status.into_iter().map(|s| (s.id, s.status)));
        }

        for device in &mut devices {
            let functions = self.get_device_functions(&device.id).await?;
            device.functions = functions.functions;
            if device.category.is_empty() {
                device.category = functions.category;
            }
            if let Some(status) = statuses.remove(&device.id) {
                device.status = status;
            }
        }

        Ok(devices)
    }

    async fn list_devices_smart_home(&self) -> Result<Vec<Device>, Error> {
        let listing: DeviceList = self
            .get(
                "/v1.0/iot-01/associated-users/devices",
                Some(&query([("size", "100")])),
            )
            .await?
            .result_as()?;
        let mut devices = listing.list;

        let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        let mut batches: Vec<BatchFunctions> = Vec::new();
        for chunk in chunk_ids(&ids, BATCH_SIZE) {
            let q = query([("device_ids", chunk.join(","))]);
            let found: Vec<BatchFunctions> = self
                .get("/v1.0/devices/functions", Some(&q))
                .await?
                .result_as()?;
            batches.extend(found);
        }

        // Entries are matched on their leading device id only.
        for device in &mut devices {
            if let Some(batch) = batches
                .iter()
                .find(|b| b.devices.first() == Some(&device.id))
            {
                device.functions.clone_from(&batch.functions);
                if device.category.is_empty() {
                    device.category.clone_from(&batch.category);
                }
            }
        }

        Ok(devices)
    }

    /// Details of a single device.
    pub async fn get_device_info(&self, device_id: &str) -> Result<Device, Error> {
        let path = format!("{}/{device_id}", self.project().device_prefix());
        self.get(&path, None).await?.result_as()
    }

    /// The control surface of a single device.
    pub async fn get_device_functions(&self, device_id: &str) -> Result<DeviceFunctions, Error> {
        let path = format!("{}/{device_id}/functions", self.project().device_prefix());
        self.get(&path, None).await?.result_as()
    }

    /// Current status codes of a single device.
    pub async fn get_device_status(&self, device_id: &str) -> Result<Vec<StatusEntry>, Error> {
        let path = format!("{}/{device_id}/status", self.project().device_prefix());
        self.get(&path, None).await?.result_as()
    }

    /// Unbind a device from the account.
    ///
    /// `DELETE /v1.0/devices/{id}`. Returns the raw envelope.
    pub async fn remove_device(&self, device_id: &str) -> Result<ApiResponse, Error> {
        debug!(device_id, "removing device");
        self.delete(&format!("/v1.0/devices/{device_id}")).await
    }

    /// Send one command to a device.
    ///
    /// `POST {prefix}/{id}/commands` with `{"commands": [{code, value}]}`.
    /// The envelope is returned untouched, `success: false` included.
    pub async fn send_command(
        &self,
        device_id: &str,
        code: &str,
        value: Value,
    ) -> Result<ApiResponse, Error> {
        let path = format!("{}/{device_id}/commands", self.project().device_prefix());
        debug!(device_id, code, "sending command");
        let body = json!({ "commands": [{ "code": code, "value": value }] });
        self.post(&path, Some(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_preserves_order() {
        let ids: Vec<String> = (0..45).map(|i| format!("d{i}")).collect();
        let chunks = chunk_ids(&ids, BATCH_SIZE);

        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![20, 20, 5]
        );
        assert_eq!(chunks[0][0], "d0");
        assert_eq!(chunks[1][0], "d20");
        assert_eq!(chunks[2][4], "d44");
        assert_eq!(chunks.concat(), ids);
    }

    #[test]
    fn chunking_empty_input() {
        assert!(chunk_ids(&[], BATCH_SIZE).is_empty());
    }
}
