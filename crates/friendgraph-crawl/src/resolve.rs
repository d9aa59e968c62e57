//! Cache-or-fetch resolution of one account's friend record.

use tracing::debug;

use friendgraph_core::{AccountId, Credential, Error, FriendRecord, Result};
use friendgraph_source::{fetch_display_names, AccountSource};
use friendgraph_store::AccountCache;

pub(crate) struct Resolved {
    pub record: FriendRecord,
    pub from_cache: bool,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("cache task failed: {}", e)))?
}

pub(crate) async fn resolve_record<S: AccountSource>(
    source: &S,
    cache: &AccountCache,
    id: &AccountId,
    credential: &Credential,
    force_recrawl: bool,
) -> Result<Resolved> {
    if !force_recrawl {
        let (cache, key) = (cache.clone(), id.clone());
        let hit = blocking(move || {
            if cache.exists(&key) {
                cache.load(&key).map(Some)
            } else {
                Ok(None)
            }
        })
        .await?;
        if let Some(record) = hit {
            return Ok(Resolved {
                record,
                from_cache: true,
            });
        }
    }

    if !id.is_well_formed() {
        return Err(Error::InvalidAccountId(id.to_string()));
    }

    let mut friends = source.fetch_friend_list(id, credential).await?;

    let mut lookup: Vec<AccountId> = friends.iter().map(|f| f.account_id.clone()).collect();
    lookup.push(id.clone());
    let names = fetch_display_names(source, &lookup, credential).await?;

    for friend in &mut friends {
        if let Some(name) = names.get(&friend.account_id) {
            friend.username = name.clone();
        }
    }
    let record = FriendRecord {
        account_id: id.clone(),
        username: names.get(id).cloned().unwrap_or_default(),
        friends,
    };

    let (writer, key, to_store) = (cache.clone(), id.clone(), record.clone());
    let created = blocking(move || writer.store(&key, &to_store)).await?;
    if !created {
        debug!("Record for {} already cached, kept the existing one", id);
    }

    Ok(Resolved {
        record,
        from_cache: false,
    })
}
