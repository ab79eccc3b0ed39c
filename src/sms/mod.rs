use std::time::Duration;

use crate::config::Config;

const GATEWAY_BASE: &str = "https://api.twilio.com/2010-04-01";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// 短信通知发送器
///
/// 网关未配置时降级为日志输出；发送永远是尽力而为，
/// 失败只记录不上抛，调用方不区分投递结果
pub struct SmsSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl SmsSender {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;

        Ok(Self {
            client,
            account_sid: config.sms_account_sid.clone(),
            auth_token: config.sms_auth_token.clone(),
            from_number: config.sms_from_number.clone(),
        })
    }

    fn configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }

    pub async fn send(&self, phone: &str, message: &str) {
        if !self.configured() {
            tracing::info!("[mock sms] to {}: {}", phone, message);
            return;
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            GATEWAY_BASE, self.account_sid
        );
        let params = [
            ("To", phone),
            ("From", self.from_number.as_str()),
            ("Body", message),
        ];

        let result = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => tracing::debug!("Sent sms to {}", phone),
            Err(e) => tracing::warn!("Failed to send sms to {}: {}", phone, e),
        }
    }

    /// 测试用：未配置网关的发送器，send 只打日志
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        }
    }
}
