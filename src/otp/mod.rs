use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sms::SmsSender;

/// 进程内一次性验证码存储
///
/// 每个手机号至多一条有效记录，重新签发覆盖旧记录；
/// issue/verify/清扫都经由同一把锁串行化。
/// 后台清扫由组合根显式 start/stop，不在构造时隐式启动
pub struct OtpStore {
    entries: Mutex<HashMap<String, OtpEntry>>,
    ttl: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

struct OtpEntry {
    code: String,
    expires_at: Instant,
}

impl OtpStore {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    /// 生成并登记 6 位验证码，通过短信发送，返回验证码
    pub async fn issue(&self, phone: &str, sms: &SmsSender) -> String {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();

        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                phone.to_string(),
                OtpEntry {
                    code: code.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }

        let minutes = self.ttl.as_secs() / 60;
        sms.send(
            phone,
            &format!("您的灾害管理平台验证码为 {code}，{minutes} 分钟内有效"),
        )
        .await;

        code
    }

    /// 验证并消费：存在、未过期且完全匹配才返回 true 并删除记录。
    /// 过期记录在失败的验证中顺手删除。
    /// 过期和错码对调用方不可区分
    pub fn verify(&self, phone: &str, candidate: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();

        let Some(entry) = entries.get(phone) else {
            return false;
        };

        if Instant::now() > entry.expires_at {
            entries.remove(phone);
            return false;
        }

        if entry.code == candidate {
            entries.remove(phone);
            return true;
        }

        false
    }

    fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at >= now);
        before - entries.len()
    }

    /// 启动周期清扫任务，重复调用无效果
    pub fn start(self: Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.is_some() {
            return;
        }

        let store = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.sweep_interval);
            // interval 的第一个 tick 立即完成
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    tracing::debug!("Swept {} expired otp entries", removed);
                }
            }
        });

        *sweeper = Some(handle);
    }

    /// 停止清扫任务，进程关闭时由组合根调用
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn store() -> Arc<OtpStore> {
        Arc::new(OtpStore::new(
            Duration::from_secs(300),
            Duration::from_secs(300),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn verify_consumes_code_exactly_once() {
        let store = store();
        let sms = SmsSender::disabled();

        let code = store.issue("9999999999", &sms).await;
        assert_eq!(code.len(), 6);

        assert!(store.verify("9999999999", &code));
        assert!(!store.verify("9999999999", &code));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_code_does_not_consume_entry() {
        let store = store();
        let sms = SmsSender::disabled();

        let code = store.issue("9876543210", &sms).await;
        assert!(!store.verify("9876543210", "000000"));
        assert!(store.verify("9876543210", &code));
    }

    #[tokio::test(start_paused = true)]
    async fn reissue_overwrites_previous_code() {
        let store = store();
        let sms = SmsSender::disabled();

        let first = store.issue("9000000001", &sms).await;
        let second = store.issue("9000000001", &sms).await;

        if first != second {
            assert!(!store.verify("9000000001", &first));
        }
        assert!(store.verify("9000000001", &second));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_valid_just_before_ttl_and_dead_just_after() {
        let store = store();
        let sms = SmsSender::disabled();

        let code = store.issue("9111111111", &sms).await;
        advance(Duration::from_secs(299)).await;
        assert!(store.verify("9111111111", &code));

        let code = store.issue("9111111111", &sms).await;
        advance(Duration::from_secs(301)).await;
        assert!(!store.verify("9111111111", &code));
        // 过期记录被失败的验证删除
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_abandoned_entries() {
        let store = store();
        let sms = SmsSender::disabled();

        store.issue("9000000001", &sms).await;
        store.issue("9000000002", &sms).await;
        assert_eq!(store.len(), 2);

        store.clone().start();
        // 越过 TTL 和一个清扫周期
        advance(Duration::from_secs(301)).await;
        advance(Duration::from_secs(301)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(store.len(), 0);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_is_a_no_op() {
        let store = store();
        store.stop();
    }
}
