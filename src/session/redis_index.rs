use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use crate::error::Result;
use crate::models::session::{RefreshTokenData, TokenData};
use crate::session::index::SessionIndex;

// Multi-key mutations run as Lua scripts so Redis applies each one
// atomically. Key layout:
//   token:{t}            -> TokenData JSON
//   refresh:{r}          -> RefreshTokenData JSON
//   refresh_link:{r}     -> access token currently bound to r
//   user_sessions:{uid}  -> set of the user's refresh tokens; members whose
//                           refresh record expired are pruned on each store

const REMOVE_USER_LUA: &str = r#"
local function remove_user(set_key)
  local removed = 0
  for _, r in ipairs(redis.call('SMEMBERS', set_key)) do
    local t = redis.call('GET', 'refresh_link:' .. r)
    if t then redis.call('DEL', 'token:' .. t) end
    redis.call('DEL', 'refresh_link:' .. r)
    removed = removed + redis.call('DEL', 'refresh:' .. r)
  end
  redis.call('DEL', set_key)
  return removed
end
"#;

const STORE_PAIR_LUA: &str = r#"
local function store_pair(set_key, t, t_json, t_ttl, r, r_json, r_ttl)
  redis.call('SET', 'token:' .. t, t_json, 'EX', t_ttl)
  redis.call('SET', 'refresh:' .. r, r_json, 'EX', r_ttl)
  redis.call('SET', 'refresh_link:' .. r, t, 'EX', r_ttl)
  for _, member in ipairs(redis.call('SMEMBERS', set_key)) do
    if redis.call('EXISTS', 'refresh:' .. member) == 0 then
      redis.call('SREM', set_key, member)
    end
  end
  redis.call('SADD', set_key, r)
  if redis.call('TTL', set_key) < tonumber(r_ttl) then
    redis.call('EXPIRE', set_key, r_ttl)
  end
end
"#;

const INSERT_BODY: &str = r#"
local removed = 0
if ARGV[1] == '1' then removed = remove_user(KEYS[1]) end
store_pair(KEYS[1], ARGV[2], ARGV[3], ARGV[4], ARGV[5], ARGV[6], ARGV[7])
return removed
"#;

const SWAP_BODY: &str = r#"
local previous = redis.call('GET', 'refresh_link:' .. ARGV[1])
if not previous then return 0 end
redis.call('DEL', 'token:' .. previous)
redis.call('SET', 'token:' .. ARGV[2], ARGV[3], 'EX', ARGV[4])
redis.call('SET', 'refresh_link:' .. ARGV[1], ARGV[2], 'KEEPTTL')
return 1
"#;

const ROTATE_BODY: &str = r#"
if redis.call('EXISTS', 'refresh:' .. ARGV[1]) == 0 then return 0 end
local previous = redis.call('GET', 'refresh_link:' .. ARGV[1])
if previous then redis.call('DEL', 'token:' .. previous) end
redis.call('DEL', 'refresh:' .. ARGV[1], 'refresh_link:' .. ARGV[1])
redis.call('SREM', KEYS[1], ARGV[1])
store_pair(KEYS[1], ARGV[2], ARGV[3], ARGV[4], ARGV[5], ARGV[6], ARGV[7])
return 1
"#;

const DELETE_USER_BODY: &str = r#"
return remove_user(KEYS[1])
"#;

fn user_key(user_id: Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

fn ttl_secs(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    (expires_at - issued_at).num_seconds().max(1)
}

/// A session index backed by Redis; records expire through key TTLs.
#[derive(Clone)]
pub struct RedisSessionIndex {
    redis: ConnectionManager,
    insert: Script,
    swap: Script,
    rotate: Script,
    delete_user: Script,
}

impl RedisSessionIndex {
    /// Creates an index over an existing connection manager.
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            insert: Script::new(&format!("{}{}{}", REMOVE_USER_LUA, STORE_PAIR_LUA, INSERT_BODY)),
            swap: Script::new(SWAP_BODY),
            rotate: Script::new(&format!("{}{}", STORE_PAIR_LUA, ROTATE_BODY)),
            delete_user: Script::new(&format!("{}{}", REMOVE_USER_LUA, DELETE_USER_BODY)),
        }
    }

    /// Connects to `redis_url` and wraps the connection.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        tracing::info!("✅ Redis Connection Manager initialized for sessions");
        Ok(Self::new(redis))
    }
}

#[async_trait]
impl SessionIndex for RedisSessionIndex {
    async fn get_token(&self, token: &str) -> Result<Option<TokenData>> {
        let mut con = self.redis.clone();
        let raw: Option<String> = con.get(format!("token:{}", token)).await?;
        raw.map(|json| sonic_rs::from_str::<TokenData>(&json).map_err(Into::into))
            .transpose()
    }

    async fn get_refresh_token(&self, refresh_token: &str) -> Result<Option<RefreshTokenData>> {
        let mut con = self.redis.clone();
        let (raw, current): (Option<String>, Option<String>) = redis::pipe()
            .get(format!("refresh:{}", refresh_token))
            .get(format!("refresh_link:{}", refresh_token))
            .query_async(&mut con)
            .await?;

        let Some(json) = raw else {
            return Ok(None);
        };
        let mut data: RefreshTokenData = sonic_rs::from_str(&json)?;
        // The link key is authoritative after a reissue
        if let Some(current) = current {
            data.current_token = current;
        }
        Ok(Some(data))
    }

    async fn insert_session(
        &self,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
        supersede: bool,
    ) -> Result<()> {
        let mut con = self.redis.clone();
        let removed: i64 = self
            .insert
            .key(user_key(refresh_data.user_id))
            .arg(if supersede { "1" } else { "0" })
            .arg(token)
            .arg(sonic_rs::to_string(token_data)?)
            .arg(ttl_secs(token_data.issued_at, token_data.expires_at))
            .arg(refresh_token)
            .arg(sonic_rs::to_string(refresh_data)?)
            .arg(ttl_secs(refresh_data.issued_at, refresh_data.expires_at))
            .invoke_async(&mut con)
            .await?;

        if removed > 0 {
            tracing::debug!("Superseded {} session(s) for user {}", removed, refresh_data.user_id);
        }
        Ok(())
    }

    async fn swap_token(&self, refresh_token: &str, token: &str, token_data: &TokenData) -> Result<bool> {
        let mut con = self.redis.clone();
        let swapped: i64 = self
            .swap
            .arg(refresh_token)
            .arg(token)
            .arg(sonic_rs::to_string(token_data)?)
            .arg(ttl_secs(token_data.issued_at, token_data.expires_at))
            .invoke_async(&mut con)
            .await?;
        Ok(swapped == 1)
    }

    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        token: &str,
        token_data: &TokenData,
        refresh_token: &str,
        refresh_data: &RefreshTokenData,
    ) -> Result<bool> {
        let mut con = self.redis.clone();
        let rotated: i64 = self
            .rotate
            .key(user_key(refresh_data.user_id))
            .arg(old_refresh_token)
            .arg(token)
            .arg(sonic_rs::to_string(token_data)?)
            .arg(ttl_secs(token_data.issued_at, token_data.expires_at))
            .arg(refresh_token)
            .arg(sonic_rs::to_string(refresh_data)?)
            .arg(ttl_secs(refresh_data.issued_at, refresh_data.expires_at))
            .invoke_async(&mut con)
            .await?;
        Ok(rotated == 1)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<usize> {
        let mut con = self.redis.clone();
        let removed: i64 = self
            .delete_user
            .key(user_key(user_id))
            .invoke_async(&mut con)
            .await?;
        Ok(removed.max(0) as usize)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        tracing::debug!("Redis session expiry is handled by key TTLs");
        Ok(0)
    }
}
