use crate::{
    amount::Amount,
    errors::{
        GatewayError,
        RemoteWriteError,
    },
    remote::{
        Address,
        RemoteData,
        RemoteKey,
        RemoteReader,
        RemoteWriter,
        ValueKind,
        WriteArgs,
        WriteReceipt,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use tracing::debug;

/// JSON relay in front of the lottery contract. Reads map to contract view
/// calls; writes are signed and submitted by the relay on behalf of `from`.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    base_url: String,
    contract: Address,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ReadRequestDto {
    method: &'static str,
    args: Vec<String>,
}

#[derive(Deserialize)]
struct ReadResponseDto {
    #[serde(default)]
    value: Value,
}

#[derive(Serialize)]
struct WriteRequestDto {
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl WriteRequestDto {
    /// Amounts travel as decimal unit strings; JSON numbers cannot hold a u128.
    fn new(method: &'static str, args: &WriteArgs) -> Self {
        Self {
            method,
            from: args.from.map(|from| from.to_string()),
            value: args.value.map(|value| value.units().to_string()),
        }
    }
}

#[derive(Deserialize)]
struct WriteResponseDto {
    #[serde(default)]
    tx_hash: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, contract: Address) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            contract,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    fn url(&self, op: &str) -> String {
        format!("{}/contracts/{}/{}", self.base_url, self.contract, op)
    }

    async fn read(
        &self,
        key: RemoteKey,
        caller: Option<&Address>,
    ) -> Result<Option<RemoteData>, GatewayError> {
        let args = match (key.is_caller_scoped(), caller) {
            (true, Some(caller)) => vec![caller.to_string()],
            _ => Vec::new(),
        };
        let res = self
            .http
            .post(self.url("read"))
            .json(&ReadRequestDto {
                method: key.method(),
                args,
            })
            .send()
            .await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(GatewayError::Status { status, body });
        }
        let dto: ReadResponseDto = res.json().await?;
        debug!(%key, "read remote value");
        decode(key, dto.value)
    }

    async fn write(
        &self,
        method: &'static str,
        args: WriteArgs,
    ) -> Result<WriteReceipt, GatewayError> {
        let res = self
            .http
            .post(self.url("write"))
            .json(&WriteRequestDto::new(method, &args))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(GatewayError::Status { status, body });
        }
        let dto: WriteResponseDto = res.json().await?;
        Ok(WriteReceipt {
            tx_hash: dto.tx_hash,
        })
    }
}

impl RemoteReader for HttpGateway {
    type Error = GatewayError;

    async fn read_value(
        &self,
        key: RemoteKey,
        caller: Option<&Address>,
    ) -> Result<Option<RemoteData>, Self::Error> {
        self.read(key, caller).await
    }
}

impl RemoteWriter for HttpGateway {
    async fn invoke(
        &self,
        method: &'static str,
        args: WriteArgs,
    ) -> Result<WriteReceipt, RemoteWriteError> {
        self.write(method, args)
            .await
            .map_err(|err| RemoteWriteError::new(err.to_string()))
    }
}

/// Converts a JSON payload into the typed value expected for `key`.
/// Integers may arrive as JSON numbers or decimal strings.
pub fn decode(key: RemoteKey, value: Value) -> Result<Option<RemoteData>, GatewayError> {
    if value.is_null() {
        return Ok(None);
    }
    let invalid = |reason: String| GatewayError::InvalidPayload { key, reason };
    let data = match key.kind() {
        ValueKind::Amount => RemoteData::Amount(Amount::from_units(
            integer(&value).ok_or_else(|| invalid(format!("not an integer: {value}")))?,
        )),
        ValueKind::Count => {
            let count = integer(&value)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| invalid(format!("not a count: {value}")))?;
            RemoteData::Count(count)
        }
        ValueKind::Timestamp => {
            let secs = integer(&value)
                .and_then(|n| i64::try_from(n).ok())
                .ok_or_else(|| invalid(format!("not a unix timestamp: {value}")))?;
            let at = DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| invalid(format!("timestamp out of range: {secs}")))?;
            RemoteData::Timestamp(at)
        }
        ValueKind::Address => RemoteData::Address(address(&value).map_err(invalid)?),
        ValueKind::AddressList => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(format!("not an array: {value}")))?;
            let list = items
                .iter()
                .map(address)
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;
            RemoteData::Addresses(list)
        }
    };
    Ok(Some(data))
}

fn integer(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse::<u128>().ok(),
        _ => None,
    }
}

fn address(value: &Value) -> Result<Address, String> {
    value
        .as_str()
        .ok_or_else(|| format!("not a string: {value}"))?
        .parse::<Address>()
        .map_err(|err| err.to_string())
}
